/// Service layer for identity-service
///
/// - Authentication (signup, login, token refresh and verification)
/// - Verification (one-time codes for email and phone)
/// - Throttling policy for code requests and submissions
/// - Notification dispatch (SMS via AWS SNS, email via SMTP)
pub mod auth;
pub mod notification;
pub mod throttle;
pub mod verification;

pub use auth::{AuthOutcome, AuthService, SignupProfile};
pub use notification::{
    ChannelDispatcher, DeliveryError, EmailDispatcher, LoggingDispatcher, NotificationDispatcher,
    SmsDispatcher,
};
pub use throttle::VerificationPolicy;
pub use verification::{ChallengeSent, VerificationService};
