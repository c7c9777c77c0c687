pub mod credential;
pub mod dispatcher;
pub mod fcm;
pub mod provider;
pub mod retry;
pub mod scanner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatcher::NotificationDispatcher;
pub use provider::{CredentialError, DeliveryCredential, DeliveryError, DeliveryProvider};
pub use scanner::WatermarkScanner;
