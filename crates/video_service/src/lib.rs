//! Public video API: listing, lookup, CRUD, comment trees and reactions.

pub mod catalog;
pub mod engagement;
pub mod error;
pub mod hierarchy;
pub mod routes;

pub use catalog::{Catalog, ListedVideo, VideoPage};
pub use engagement::{EngagementCoordinator, ReactionPolicy, ReconcileReport, RepairSummary};
pub use error::{FieldError, ServiceError, ServiceResult, Step};
pub use hierarchy::{CommentTree, Orphan, OrphanReason, build_comment_tree};
pub use routes::{ActingChannel, AppState, CHANNEL_HEADER, create_router};
