//! Note list filtering
//!
//! Turns the current search term and category filter into exactly one
//! live note query. Changing either input replaces the active query;
//! the previous subscription is cancelled before the new one starts, so
//! results from a superseded query are never delivered.

use crate::database::{LiveQuery, Note, Repository};
use crate::error::Result;

/// How a search term and a category filter combine when both are set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompositionRule {
    /// A non-blank search term wins and the category is ignored
    #[default]
    SearchWins,
    /// Both predicates must hold
    Conjunctive,
}

/// The query a note list should currently be showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    All,
    BySearch(String),
    ByCategory(String),
    BySearchAndCategory { term: String, category: String },
}

impl QueryIntent {
    /// Pick the intent for the given inputs. Whitespace-only terms count as
    /// empty; any other term is kept exactly as typed.
    pub fn compose(term: &str, category: Option<&str>, rule: CompositionRule) -> Self {
        match (term.trim().is_empty(), category) {
            (false, Some(category)) => match rule {
                CompositionRule::SearchWins => QueryIntent::BySearch(term.to_string()),
                CompositionRule::Conjunctive => QueryIntent::BySearchAndCategory {
                    term: term.to_string(),
                    category: category.to_string(),
                },
            },
            (false, None) => QueryIntent::BySearch(term.to_string()),
            (true, Some(category)) => QueryIntent::ByCategory(category.to_string()),
            (true, None) => QueryIntent::All,
        }
    }

    /// Start the live query this intent describes
    pub fn subscribe(&self, repo: &Repository) -> LiveQuery<Note> {
        match self {
            QueryIntent::All => repo.get_all_notes(),
            QueryIntent::BySearch(term) => repo.search_notes(term),
            QueryIntent::ByCategory(category) => repo.get_notes_by_category(category),
            QueryIntent::BySearchAndCategory { term, category } => {
                repo.search_notes_in_category(term, category)
            }
        }
    }
}

/// Search and category state for a note list, with its one active query
pub struct NoteFilter {
    repo: Repository,
    rule: CompositionRule,
    search_term: String,
    category: Option<String>,
    intent: QueryIntent,
    active: Option<LiveQuery<Note>>,
}

impl NoteFilter {
    /// Filter with no search term and no category, showing all notes.
    /// Must be called inside a tokio runtime.
    pub fn new(repo: Repository) -> Self {
        Self::with_rule(repo, CompositionRule::default())
    }

    pub fn with_rule(repo: Repository, rule: CompositionRule) -> Self {
        let intent = QueryIntent::All;
        let active = Some(intent.subscribe(&repo));

        Self {
            repo,
            rule,
            search_term: String::new(),
            category: None,
            intent,
            active,
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn rule(&self) -> CompositionRule {
        self.rule
    }

    /// The query currently feeding [`NoteFilter::next`]
    pub fn intent(&self) -> &QueryIntent {
        &self.intent
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.recompose();
    }

    pub fn clear_search(&mut self) {
        self.set_search_term(String::new());
    }

    pub fn set_category_filter(&mut self, category: Option<String>) {
        self.category = category;
        self.recompose();
    }

    pub fn clear_category_filter(&mut self) {
        self.set_category_filter(None);
    }

    /// Next result set of the active query.
    ///
    /// `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Result<Vec<Note>>> {
        match self.active.as_mut() {
            Some(live) => live.next().await,
            None => None,
        }
    }

    fn recompose(&mut self) {
        let intent = QueryIntent::compose(&self.search_term, self.category.as_deref(), self.rule);
        if intent == self.intent && self.active.is_some() {
            return;
        }

        tracing::debug!("Switching note query from {:?} to {:?}", self.intent, intent);

        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
        self.active = Some(intent.subscribe(&self.repo));
        self.intent = intent;
    }
}
