//! Delivery plumbing: the notification service that selects and fans out to
//! notifiers, the outbound transport they share, and the image collaborator.

mod image;
mod service;
mod transport;

pub use image::{ImageRenderer, ImageUploader, RenderOpts};
pub use service::{NotificationSender, NotificationService};
pub use transport::{
    DisabledTransport, EmailMessage, HttpTransport, SmtpConfig, Transport, WebhookRequest,
};
