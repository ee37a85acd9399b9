pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{PaymentConfirmation, PaymentTransaction, TransactionStatus};
pub use repositories::{SqlxTransactionRepository, TransactionStore};
pub use services::{
    InitializePaymentRequest, InitializePaymentResponse, PaymentService, PaymentStatusResponse,
    RefundRequest, RefundResponse, VerifyPaymentResponse,
};
