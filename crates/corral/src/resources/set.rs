use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::resources::amount::ResourceAmount;
use crate::resources::value::{RangeSet, ResourceValue};
use crate::resources::{Principal, ResourceError, Role};

/// Role of resources that are not reserved for anyone.
pub const DEFAULT_ROLE: &str = "*";

/// Tag restricting a resource to the principal that reserved it.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reservation {
    pub principal: Principal,
}

impl Reservation {
    pub fn new<P: Into<Principal>>(principal: P) -> Self {
        Reservation {
            principal: principal.into(),
        }
    }
}

/// A single resource bucket. `(name, role, reservation)` is the identity;
/// buckets differing only in the tag are distinct and not interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireResource", into = "WireResource")]
pub struct Resource {
    pub name: String,
    pub role: Role,
    pub reservation: Option<Reservation>,
    pub value: ResourceValue,
}

impl Resource {
    pub fn new<N: Into<String>>(name: N, value: ResourceValue) -> Self {
        Resource {
            name: name.into(),
            role: DEFAULT_ROLE.to_string(),
            reservation: None,
            value,
        }
    }

    pub fn is_unreserved(&self) -> bool {
        self.reservation.is_none() && self.role == DEFAULT_ROLE
    }

    fn key(&self) -> (&str, &str, Option<&Reservation>) {
        (&self.name, &self.role, self.reservation.as_ref())
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}({}", self.name, self.role)?;
        if let Some(reservation) = &self.reservation {
            write!(f, ", {}", reservation.principal)?;
        }
        write!(f, "):{}", self.value)
    }
}

/// Multiset of resource buckets, kept normalized: one entry per
/// `(name, role, reservation)` key, no empty values, sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResourceSet {
    resources: SmallVec<[Resource; 4]>,
}

impl<'de> Deserialize<'de> for ResourceSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let resources = Vec::<Resource>::deserialize(deserializer)?;
        ResourceSet::from_resources(resources).map_err(serde::de::Error::custom)
    }
}

impl ResourceSet {
    pub fn from_resources<I: IntoIterator<Item = Resource>>(
        resources: I,
    ) -> Result<Self, ResourceError> {
        let mut set = ResourceSet::default();
        for resource in resources {
            set.add(resource)?;
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn get(&self, name: &str, role: &str, reservation: Option<&Reservation>) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.key() == (name, role, reservation))
    }

    /// Merges one bucket in. Fails when the bucket exists with another value kind.
    pub fn add(&mut self, resource: Resource) -> Result<(), ResourceError> {
        if resource.value.is_empty() {
            return Ok(());
        }
        match self
            .resources
            .iter_mut()
            .find(|r| r.key() == resource.key())
        {
            Some(existing) => existing.value.merge(&resource.name, &resource.value)?,
            None => {
                let at = self
                    .resources
                    .partition_point(|r| r.key() < resource.key());
                self.resources.insert(at, resource);
            }
        }
        Ok(())
    }

    pub fn union(&self, other: &ResourceSet) -> Result<ResourceSet, ResourceError> {
        let mut result = self.clone();
        for resource in other.iter() {
            result.add(resource.clone())?;
        }
        Ok(result)
    }

    /// Is `other` a sub-multiset of `self`, bucket by bucket?
    pub fn contains(&self, other: &ResourceSet) -> bool {
        other.iter().all(|needed| {
            self.get(&needed.name, &needed.role, needed.reservation.as_ref())
                .is_some_and(|held| held.value.contains(&needed.value))
        })
    }

    /// Removes `other` from `self`. `QuantityUnderflow` when not contained;
    /// after validation this class of failure is a logic error.
    pub fn checked_subtract(&self, other: &ResourceSet) -> Result<ResourceSet, ResourceError> {
        let mut result = ResourceSet::default();
        let mut remaining: Vec<&Resource> = other.iter().collect();
        for held in self.iter() {
            match remaining.iter().position(|r| r.key() == held.key()) {
                Some(at) => {
                    let needed = remaining.swap_remove(at);
                    let rest = held.value.checked_subtract(&held.name, &needed.value)?;
                    result.add(Resource {
                        name: held.name.clone(),
                        role: held.role.clone(),
                        reservation: held.reservation.clone(),
                        value: rest,
                    })?;
                }
                None => result.add(held.clone())?,
            }
        }
        if let Some(missing) = remaining.iter().find(|r| !r.value.is_empty()) {
            return Err(ResourceError::QuantityUnderflow {
                name: missing.name.clone(),
                minuend: "0".to_string(),
                subtrahend: missing.value.to_string(),
            });
        }
        Ok(result)
    }

    /// Stamps a role and reservation tag onto every bucket (reserve).
    pub fn flatten<P: Into<Principal>>(
        &self,
        role: &str,
        principal: P,
    ) -> Result<ResourceSet, ResourceError> {
        let reservation = Reservation::new(principal);
        ResourceSet::from_resources(self.iter().map(|r| Resource {
            name: r.name.clone(),
            role: role.to_string(),
            reservation: Some(reservation.clone()),
            value: r.value.clone(),
        }))
    }

    /// Strips role and reservation tag back to the defaults (unreserve).
    pub fn unflatten(&self) -> Result<ResourceSet, ResourceError> {
        ResourceSet::from_resources(self.iter().map(|r| Resource {
            name: r.name.clone(),
            role: DEFAULT_ROLE.to_string(),
            reservation: None,
            value: r.value.clone(),
        }))
    }

    /// The single role carried by all buckets, if they agree on one.
    pub fn common_role(&self) -> Option<&str> {
        let mut roles = self.iter().map(|r| r.role.as_str());
        let first = roles.next()?;
        roles.all(|r| r == first).then_some(first)
    }
}

impl std::fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        for (i, resource) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{resource}")?;
        }
        Ok(())
    }
}

impl FromIterator<Resource> for ResourceSet {
    /// Panics on kind mismatch; intended for statically known inputs.
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        ResourceSet::from_resources(iter).unwrap()
    }
}

/* Wire form of a resource, the shape operators POST to /reserve:
   {"name": "cpus", "type": "SCALAR", "scalar": {"value": 1.0},
    "role": "role", "reservation": {"principal": "ops"}} */

#[derive(Serialize, Deserialize)]
struct WireScalar {
    value: f64,
}

#[derive(Serialize, Deserialize)]
struct WireRange {
    begin: u64,
    end: u64,
}

#[derive(Serialize, Deserialize)]
struct WireRanges {
    range: Vec<WireRange>,
}

#[derive(Serialize, Deserialize)]
struct WireItems {
    item: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct WireResource {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scalar: Option<WireScalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ranges: Option<WireRanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set: Option<WireItems>,
    #[serde(default = "default_role")]
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reservation: Option<Reservation>,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl TryFrom<WireResource> for Resource {
    type Error = String;

    fn try_from(wire: WireResource) -> Result<Self, Self::Error> {
        let value = match (wire.kind.as_str(), wire.scalar, wire.ranges, wire.set) {
            ("SCALAR", Some(scalar), None, None) => {
                let amount = ResourceAmount::from_f64(scalar.value).ok_or_else(|| {
                    format!("resource `{}` has invalid scalar {}", wire.name, scalar.value)
                })?;
                ResourceValue::Scalar(amount)
            }
            ("RANGES", None, Some(ranges), None) => ResourceValue::Ranges(RangeSet::new(
                ranges.range.into_iter().map(|r| (r.begin, r.end)),
            )),
            ("SET", None, None, Some(items)) => {
                ResourceValue::Items(items.item.into_iter().collect())
            }
            _ => {
                return Err(format!(
                    "resource `{}` has type {:?} not matching its payload",
                    wire.name, wire.kind
                ));
            }
        };
        if wire.name.is_empty() {
            return Err("resource with empty name".to_string());
        }
        if wire.role.is_empty() {
            return Err(format!("resource `{}` has an empty role", wire.name));
        }
        Ok(Resource {
            name: wire.name,
            role: wire.role,
            reservation: wire.reservation,
            value,
        })
    }
}

impl From<Resource> for WireResource {
    fn from(resource: Resource) -> Self {
        let (scalar, ranges, set) = match &resource.value {
            ResourceValue::Scalar(amount) => (Some(WireScalar { value: amount.as_f64() }), None, None),
            ResourceValue::Ranges(range_set) => (
                None,
                Some(WireRanges {
                    range: range_set
                        .iter()
                        .map(|(begin, end)| WireRange { begin, end })
                        .collect(),
                }),
                None,
            ),
            ResourceValue::Items(items) => (
                None,
                None,
                Some(WireItems {
                    item: items.iter().cloned().collect(),
                }),
            ),
        };
        WireResource {
            kind: resource.value.kind().to_string(),
            name: resource.name,
            scalar,
            ranges,
            set,
            role: resource.role,
            reservation: resource.reservation,
        }
    }
}
