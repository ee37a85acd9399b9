pub mod completion;

pub use completion::{LoggingCompletionHook, PaymentCompleted, PaymentCompletedHook};
