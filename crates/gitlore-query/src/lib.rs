//! Question answering over embedded repository history.
//!
//! A question is classified by ordered keyword routes, dispatched to exactly
//! one handler, and composed into an [`Answer`] whose summary is derived from
//! the supporting data alone.

pub mod answer;
pub mod collaborators;
pub mod error;
pub mod handler;
pub mod intent;
pub mod router;
pub mod services;

pub use answer::{Answer, AnswerType, HandlerOutput, Insight, QueryContext, SupportingData};
pub use collaborators::{
    DisabledNarrator, GraphAnalytics, GraphSnapshot, Narrative, Narrator, NoGraphAnalytics,
    OpenAiNarrator, SnapshotGraphAnalytics,
};
pub use error::QueryError;
pub use intent::{classify, Intent, KeywordMatcher, RoutePredicate};
pub use router::{QueryHandler, QueryRouter};
pub use services::{QueryServices, QuerySettings};
