pub mod error;
#[macro_use]
pub mod ids;
pub mod setup;
pub mod wrapped;

use fxhash::FxBuildHasher;

pub type Map<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;
pub type Set<T> = hashbrown::HashSet<T, FxBuildHasher>;
