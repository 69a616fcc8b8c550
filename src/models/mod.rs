//! Data models
//!
//! Records stored by the service and the request/response types built on them.

mod ai;
mod author;
mod booking;
mod category;
mod conversation;
mod enquiry;
mod post;
mod tag;

pub use ai::{
    AiOptimizationDraft, AvailableTag, CategorizationDraft, ContentDraft, GenerateContentRequest,
    GenerateImageRequest, GeneratedContent, GeneratedImage, SeoDraft,
};
pub use author::{Author, CreateAuthorInput};
pub use booking::{AvailableTime, BookingRecord, BookingRequest, BookingResponse};
pub use category::{Category, CategoryFilter, CategoryInput};
pub use conversation::{
    ChatEvent, ChatMessage, Conversation, ConversationStatus, ConversationSummary,
    ConversationWithMessages, ReadReceipt, SenderType, TypingState,
};
pub use enquiry::{CreateEnquiryInput, Enquiry, EnquiryFilter, EnquiryStatus, Survey};
pub use post::{
    Entity, Faq, FaqInput, ListParams, PagedResult, Post, PostInput, PostStatus, PostWithRelations,
    PostWrite, RelatedPostInput, Source,
};
pub use tag::{CreateTagInput, Tag, TagWithCount};
