//! Record repositories. One module per table, each a set of free async
//! functions borrowing the pool for the duration of a single call.

pub mod attendance;
pub mod coaches;
pub mod members;
pub mod payments;
pub mod schedules;
pub mod subscriptions;
pub mod users;

pub use attendance::*;
pub use coaches::*;
pub use members::*;
pub use payments::*;
pub use schedules::*;
pub use subscriptions::*;
pub use users::*;
