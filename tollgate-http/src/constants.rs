//! HTTP header names for the tollgate protocol.

/// Header carrying the payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Header carrying the settlement receipt (server → paid client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";
