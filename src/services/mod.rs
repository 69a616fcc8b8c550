//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories and the
//! cache. They validate input, coordinate side effects (cache invalidation,
//! realtime events, notifications) and report failures as typed errors.

pub mod ai;
pub mod author;
pub mod booking;
pub mod category;
pub mod enquiry;
pub mod gone;
pub mod live_chat;
pub mod notification;
pub mod post;
pub mod rate_limiter;
pub mod tag;

pub use ai::{AiAssistError, AiAssistService, GenerativeClient, OpenAiClient};
pub use author::{AuthorService, AuthorServiceError};
pub use booking::{
    AvailableTimesQuery, AvailableTimesResponse, BookingError, BookingService, CalendlyClient,
    SchedulingClient,
};
pub use category::{CategoryService, CategoryServiceError};
pub use enquiry::{EnquiryQuery, EnquiryService, EnquiryServiceError};
pub use gone::{GoneMatcher, GONE_HTML};
pub use live_chat::{ChatService, ChatServiceError, StartConversation};
pub use notification::{ChatNotification, ChatNotifier, NotificationSender};
pub use post::{content_stats, generate_slug, PostService, PostServiceError};
pub use rate_limiter::RateLimiter;
pub use tag::{TagService, TagServiceError};
