//! Database repositories
//!
//! One repository trait plus a SQLx implementation per aggregate.

pub mod author;
pub mod booking;
pub mod category;
pub mod conversation;
pub mod enquiry;
pub mod post;
pub mod tag;

pub use author::{AuthorRepository, SqlxAuthorRepository};
pub use booking::{BookingRepository, SqlxBookingRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use conversation::{ConversationRepository, SqlxConversationRepository};
pub use enquiry::{EnquiryRepository, SqlxEnquiryRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use tag::{SqlxTagRepository, TagRepository};
