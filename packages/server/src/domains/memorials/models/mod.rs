pub mod memorial;
