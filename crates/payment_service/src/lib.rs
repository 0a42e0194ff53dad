pub mod error;
pub mod processor;

pub use error::{Result, ServiceError};
pub use processor::{
    format_rupiah, PaymentHistory, PaymentProcessor, ProcessedPayment, ReducedPeriod,
    SantriPaymentStatus,
};
