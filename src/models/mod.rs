pub mod coupon;
pub mod like;
pub mod metrics;
pub mod order;
pub mod payment;
pub mod product;
pub mod user;

pub use coupon::*;
pub use like::*;
pub use metrics::*;
pub use order::*;
pub use payment::*;
pub use product::*;
pub use user::*;
