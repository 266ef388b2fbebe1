pub mod claim;
pub mod identity;
pub mod reference;
pub mod signature;
pub mod threshold;
