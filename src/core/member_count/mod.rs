pub mod member_count_models;
pub mod member_count_service;
pub mod member_count_store;

pub use member_count_models::MemberCountConfig;
pub use member_count_service::{MemberCountError, MemberCountService};
pub use member_count_store::{MemberCountStore, StoreError};
