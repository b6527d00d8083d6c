pub mod aliases;
pub mod backup;
pub mod clock;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod policy;
pub mod relay;
pub mod render;
pub mod roles;
pub mod scheduler;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use gateway::{GatewayError, InlineButton, InlineKeyboard, MessageGateway, OutgoingMessage};
pub use lifecycle::{ExtendOutcome, PostLifecycle, PublishRequest};
pub use relay::{OpenOutcome, RelaySessions};
pub use scheduler::{Scheduler, TickReport};
