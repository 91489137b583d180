pub mod owner;
pub mod store;

pub use owner::Owner;
pub use store::{PropertyStore, StoreKey, StoreSubscription, PROPS_STORE};
