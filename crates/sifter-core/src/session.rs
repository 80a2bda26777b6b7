//! Filter session: one explorer's filter state wired to a backend.
//!
//! Every filter change starts a fetch. Fetches can overlap, so each one
//! takes a ticket from the session's [`RequestGeneration`]; starting a new
//! fetch cancels the previous ticket and only the most recently started
//! fetch may store its result. The first stored result becomes the
//! baseline that later results are reconciled against.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggs::{AggsData, merge_tab_options, sort_tabs_options, update_counts_in_initial_tabs_options};
use crate::backend::{ExplorerBackend, HttpBackend, parse_aggregation_response};
use crate::config::{BackendConfig, ExplorerConfig};
use crate::error::ExplorerResult;
use crate::filter::{FilterState, merge_filters};
use crate::query::{GqlFilter, GraphQlRequest, PlanInput, all_fields, compile, plan};
use crate::sections::{ArrayFieldIndex, FilterSection, FilterSectionBuilder};

const DEFAULT_SEARCH_PAGE_SIZE: usize = 20;

/// Generation counter with a cancellation token per fetch.
#[derive(Debug, Default)]
pub struct RequestGeneration {
    current: AtomicU64,
    token: Mutex<CancellationToken>,
}

/// Handle for one started fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    token: CancellationToken,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancelled once a newer fetch has started.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch, cancelling the one in flight.
    pub fn begin(&self) -> FetchTicket {
        let mut token = self.token.lock();
        token.cancel();
        *token = CancellationToken::new();
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        FetchTicket {
            generation,
            token: token.clone(),
        }
    }

    /// Whether `ticket` belongs to the most recently started fetch.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.generation
    }
}

/// What happened to a fetch's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Stored as the session's current aggregation.
    Applied,
    /// A newer fetch started first; the result was discarded.
    Superseded,
}

/// Sections of one filter tab.
#[derive(Debug, Clone, Serialize)]
pub struct TabSections {
    pub title: String,
    pub sections: Vec<FilterSection>,
}

#[derive(Debug, Default)]
struct SessionState {
    /// Applied filter, admin pre-filter already merged in.
    filter: FilterState,
    received: AggsData,
    initial: Option<AggsData>,
    array_fields: Option<ArrayFieldIndex>,
    anchor_value: Option<String>,
}

/// Rewrites each fetched aggregation before it is stored, given the applied
/// filter.
pub type AggsPreprocessor = Arc<dyn Fn(&AggsData, &FilterState) -> AggsData + Send + Sync>;

/// Filter state, aggregation results and baseline for one explorer.
pub struct FilterSession {
    backend: Arc<dyn ExplorerBackend>,
    config: ExplorerConfig,
    search_page_size: usize,
    preprocess: Option<AggsPreprocessor>,
    generation: RequestGeneration,
    state: RwLock<SessionState>,
}

impl FilterSession {
    pub fn new(backend: Arc<dyn ExplorerBackend>, config: ExplorerConfig) -> Self {
        Self {
            backend,
            config,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
            preprocess: None,
            generation: RequestGeneration::new(),
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Session over an [`HttpBackend`] built from `backend_config`, using its
    /// search page size.
    pub fn connect(backend_config: &BackendConfig, config: ExplorerConfig) -> ExplorerResult<Self> {
        let backend = Arc::new(HttpBackend::new(backend_config)?);
        Ok(Self::new(backend, config).with_search_page_size(backend_config.search_page_size))
    }

    pub fn with_search_page_size(mut self, search_page_size: usize) -> Self {
        self.search_page_size = search_page_size;
        self
    }

    /// Run every fetched aggregation through `preprocess` before it is
    /// stored, including the one captured as baseline.
    pub fn with_aggs_preprocessor(
        mut self,
        preprocess: impl Fn(&AggsData, &FilterState) -> AggsData + Send + Sync + 'static,
    ) -> Self {
        self.preprocess = Some(Arc::new(preprocess));
        self
    }

    pub fn search_page_size(&self) -> usize {
        self.search_page_size
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Applied filter of the last stored result.
    pub fn applied_filter(&self) -> FilterState {
        self.state.read().filter.clone()
    }

    /// Aggregation of the last stored result.
    pub fn received_aggs(&self) -> AggsData {
        self.state.read().received.clone()
    }

    /// Baseline captured from the first stored result.
    pub fn initial_aggs(&self) -> Option<AggsData> {
        self.state.read().initial.clone()
    }

    /// Anchor value used by subsequent fetches; `None` or empty disables
    /// anchor planning.
    pub fn set_anchor_value(&self, anchor_value: Option<String>) {
        self.state.write().anchor_value = anchor_value;
    }

    /// Merge the admin pre-filter into `user_filter`, fetch aggregations
    /// and store them unless a newer fetch started meanwhile.
    pub async fn apply_filter(&self, user_filter: FilterState) -> ExplorerResult<RefreshOutcome> {
        let ticket = self.generation.begin();
        let merged = merge_filters(&user_filter, &self.config.admin_applied_pre_filters);
        let gql_filter = compile(&merged)?;
        let anchor_value = self.state.read().anchor_value.clone();

        let fetched = tokio::select! {
            _ = ticket.token().cancelled() => {
                debug!(generation = ticket.generation(), "aggregation fetch cancelled by newer filter");
                return Ok(RefreshOutcome::Superseded);
            }
            result = self.fetch_aggs(&gql_filter, anchor_value.as_deref()) => result,
        };

        let aggs = match fetched {
            Ok(aggs) => aggs,
            Err(_) if !self.generation.is_current(&ticket) => {
                debug!(generation = ticket.generation(), "discarding failed superseded fetch");
                return Ok(RefreshOutcome::Superseded);
            }
            Err(e) => {
                warn!(error = %e, data_type = %self.config.data_type, "aggregation query failed");
                return Err(e);
            }
        };

        let aggs = match &self.preprocess {
            Some(preprocess) => preprocess(&aggs, &merged),
            None => aggs,
        };

        let mut state = self.state.write();
        if !self.generation.is_current(&ticket) {
            debug!(generation = ticket.generation(), "discarding superseded aggregation result");
            return Ok(RefreshOutcome::Superseded);
        }
        if state.initial.is_none() {
            debug!(fields = aggs.len(), "captured initial aggregation baseline");
            state.initial = Some(aggs.clone());
        }
        state.filter = merged;
        state.received = aggs;
        Ok(RefreshOutcome::Applied)
    }

    /// Fetch aggregations: one query, or one per planned group when an
    /// anchor value is set.
    async fn fetch_aggs(
        &self,
        gql_filter: &GqlFilter,
        anchor_value: Option<&str>,
    ) -> ExplorerResult<AggsData> {
        let data_type = self.config.data_type.as_str();
        let tabs = &self.config.filters.tabs;

        let query_plan = plan(PlanInput {
            filter_tabs: tabs,
            anchor_config: self.config.filters.anchor.as_ref(),
            anchor_value,
            gql_filter: Some(gql_filter),
        });

        if query_plan.fields_by_group.len() <= 1 && query_plan.gql_filter_by_group.len() == 1 {
            let request = GraphQlRequest::aggregation(data_type, &all_fields(tabs), Some(gql_filter));
            let body = self.backend.graphql(&request).await?;
            return parse_aggregation_response(&body, data_type);
        }

        let requests = query_plan.groups().map(|(group, fields, filter)| {
            let request = GraphQlRequest::aggregation(data_type, fields, filter);
            async move {
                debug!(group = %group, fields = fields.len(), "fetching anchored aggregation group");
                let body = self.backend.graphql(&request).await?;
                parse_aggregation_response(&body, data_type)
            }
        });
        let groups = try_join_all(requests).await?;
        Ok(groups
            .iter()
            .fold(AggsData::new(), |merged, group| merge_tab_options(&merged, group)))
    }

    /// Discover array-typed fields once per session.
    pub async fn load_array_fields(&self) -> ExplorerResult<ArrayFieldIndex> {
        if let Some(index) = self.state.read().array_fields.clone() {
            return Ok(index);
        }

        let status = self.backend.field_status().await.inspect_err(|e| {
            warn!(error = %e, "failed to load array fields");
        })?;
        let index = ArrayFieldIndex::from_status(&status);
        self.state.write().array_fields = Some(index.clone());
        Ok(index)
    }

    /// Sections for every configured tab.
    ///
    /// Empty until the first result is stored. A field missing from the
    /// baseline is logged and rendered without options.
    pub fn render_tabs(&self) -> Vec<TabSections> {
        let state = self.state.read();
        let Some(initial) = state.initial.as_ref() else {
            return Vec::new();
        };

        let processed = sort_tabs_options(&update_counts_in_initial_tabs_options(
            initial,
            &state.received,
            &state.filter,
        ));
        let array_fields = state.array_fields.clone().unwrap_or_default();

        let builder = FilterSectionBuilder::new(&processed)
            .initial(initial)
            .field_mapping(&self.config.field_mapping)
            .admin_pre_filters(&self.config.admin_applied_pre_filters)
            .applied_filter(&state.filter)
            .array_fields(&array_fields)
            .search(
                self.backend.clone(),
                self.config.data_type.as_str(),
                self.search_page_size,
            );

        self.config
            .filters
            .tabs
            .iter()
            .map(|tab| TabSections {
                title: tab.title.clone(),
                sections: builder.build_lenient(&tab.fields, &tab.search_fields),
            })
            .collect()
    }
}
