//! Application Services
//!
//! Long-running tasks that coordinate the domain with the ports:
//!
//! - `SubscriptionReconciler`: keeps the live subscription in line with the watch-list
//! - `CommandIntake`: runs operator commands from the command queue
//! - `EventDispatcher`: persists book events and publishes derivative ones
//! - `RetentionCleanup`: purges stored events past the retention window

mod dispatch;
mod intake;
mod reconciler;
mod retention;

pub use dispatch::{DispatchStats, EventDispatcher};
pub use intake::{
    CommandError, CommandHandler, CommandIntake, CommandRegistry, ReconcileCommand, RestartCommand,
};
pub use reconciler::{ReconcilerConfig, SubscriptionReconciler, TickOutcome, load_desired_set};
pub use retention::{RetentionCleanup, RetentionConfig};
