pub mod payment_service;

pub use payment_service::{
    InitializePaymentRequest, InitializePaymentResponse, PaymentService, PaymentStatusResponse,
    RefundRequest, RefundResponse, VerifyPaymentResponse,
};
