//! Question routing: classify, dispatch to one handler, compose the answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::answer::{Answer, AnswerType, HandlerOutput, QueryContext};
use crate::error::QueryError;
use crate::handler::{
    CollaborationHandler, EvolutionHandler, GeneralHandler, ImpactHandler, PatternHandler,
    SemanticHandler,
};
use crate::intent::{Intent, KeywordMatcher, RoutePredicate};
use crate::services::QueryServices;

/// Answers one category of question.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    fn answer_type(&self) -> AnswerType;

    async fn handle(
        &self,
        question: &str,
        context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError>;
}

struct Route {
    name: String,
    predicate: Box<dyn RoutePredicate>,
    handler: Arc<dyn QueryHandler>,
}

/// Ordered registry of (predicate, handler) routes with a fallback handler.
pub struct QueryRouter {
    services: Arc<QueryServices>,
    routes: Vec<Route>,
    fallback: Arc<dyn QueryHandler>,
}

impl QueryRouter {
    /// Router with the built-in keyword routes and the general fallback.
    pub fn new(services: Arc<QueryServices>) -> Result<Self, QueryError> {
        let mut router = Self::empty(services, Arc::new(GeneralHandler));
        for intent in Intent::ROUTED {
            let handler: Arc<dyn QueryHandler> = match intent {
                Intent::Semantic => Arc::new(SemanticHandler),
                Intent::Evolution => Arc::new(EvolutionHandler),
                Intent::Impact => Arc::new(ImpactHandler),
                Intent::Pattern => Arc::new(PatternHandler),
                Intent::Collaboration => Arc::new(CollaborationHandler),
                Intent::General => continue,
            };
            router.register(intent.as_str(), KeywordMatcher::for_intent(intent)?, handler);
        }
        Ok(router)
    }

    /// Router with no routes; every question goes to `fallback`.
    pub fn empty(services: Arc<QueryServices>, fallback: Arc<dyn QueryHandler>) -> Self {
        Self {
            services,
            routes: Vec::new(),
            fallback,
        }
    }

    /// Append a route. Earlier routes take priority.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        predicate: impl RoutePredicate + 'static,
        handler: Arc<dyn QueryHandler>,
    ) {
        self.routes.push(Route {
            name: name.into(),
            predicate: Box::new(predicate),
            handler,
        });
    }

    /// Insert a route ahead of all existing ones.
    pub fn register_first(
        &mut self,
        name: impl Into<String>,
        predicate: impl RoutePredicate + 'static,
        handler: Arc<dyn QueryHandler>,
    ) {
        self.routes.insert(
            0,
            Route {
                name: name.into(),
                predicate: Box::new(predicate),
                handler,
            },
        );
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    /// Name of the route a question would take, `"general"` for the fallback.
    pub fn classify(&self, question: &str) -> &str {
        self.select(question).0
    }

    fn select(&self, question: &str) -> (&str, &Arc<dyn QueryHandler>) {
        self.routes
            .iter()
            .find(|r| r.predicate.matches(question))
            .map(|r| (r.name.as_str(), &r.handler))
            .unwrap_or(("general", &self.fallback))
    }

    pub async fn answer(
        &self,
        question: &str,
        context: &QueryContext,
    ) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let id = Uuid::new_v4();
        let (route, handler) = self.select(question);
        let span = info_span!("query", %id, route);

        async {
            info!(question, "Routing question");
            let output = handler.handle(question, context, &self.services).await?;
            let answer = Answer::compose(id, question, handler.answer_type(), output);
            info!(
                answer_type = %answer.answer_type,
                insights = answer.insights.len(),
                "Question answered"
            );
            Ok(answer)
        }
        .instrument(span)
        .await
    }
}
