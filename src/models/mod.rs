pub mod money;

mod invoice;
mod plan_payment;
mod settings;
mod share;
mod subscription;
mod ticket;
mod user;

pub use invoice::*;
pub use plan_payment::*;
pub use settings::*;
pub use share::*;
pub use subscription::*;
pub use ticket::*;
pub use user::*;
