//! # IRIS Client
//!
//! Async access to the IRIS annotation backend and the state of the
//! segmentation workspace built on top of it.
//!
//! - [`IrisClient`]: REST client with session cookies and a fallback
//!   backend URL
//! - [`SegmentationBackend`]: the operations the workspace needs, so tests
//!   can run without a server
//! - [`SegmentationWorkspace`]: current image, mask editor, tools, filters
//!   and notices, with stale async results discarded

pub mod backend;
pub mod base;
pub mod client;
pub mod commands;
pub mod error;
pub mod workspace;

pub use backend::SegmentationBackend;
pub use base::{ApiPath, BACKEND_URL_ENV, BackendUrl};
pub use client::{IrisClient, IrisClientBuilder};
pub use commands::WorkspaceCommand;
pub use error::{ClientError, Result};
pub use workspace::{
    CancelFlag, Direction, LoadOutcome, LoadTicket, LoadedImage, LoaderState, Notice, NoticeLevel,
    SaveGuard, SavePermit, SaveTicket, SegmentationWorkspace, Tool,
};
