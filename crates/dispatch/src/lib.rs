//! Request-side half of the job protocol: submit artifacts and wait for
//! their results.

pub mod dispatcher;
pub mod error;
pub mod poller;

pub use dispatcher::{Dispatcher, DispatcherConfig, IdStrategy, Submission};
pub use error::{PollError, SubmitError};
pub use poller::{PollPolicy, Poller};
