pub mod utils;

mod test_http;
mod test_reservation;
