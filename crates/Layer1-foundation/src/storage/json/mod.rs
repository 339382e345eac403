mod store;

pub use store::{JsonStore, WARDEN_DIR};
