use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::time::sleep;
use url::Url;

use crate::client::HttpsClient;
use crate::executor::instrument::make_request;
use crate::models::dsl_model::{DslConfig, ScenarioConfig};
use crate::models::metrics::{
    Metrics, ITERATIONS, ITERATION_DURATION, LATENCY_FILTER, LATENCY_LIST_SHOWS, LATENCY_SEARCH,
    LATENCY_SINGLE_SHOW, LATENCY_STATS_CATEGORIES, LATENCY_STATS_YEARLY, LATENCY_TOP_DIRECTORS,
    LATENCY_TOP_GENRES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ListShows,
    SingleShow,
    Search,
    Filter,
    TopDirectors,
    TopGenres,
    StatsCategories,
    StatsYearly,
}

impl Endpoint {
    /// In the order one iteration requests them.
    pub const ALL: [Endpoint; 8] = [
        Endpoint::ListShows,
        Endpoint::SingleShow,
        Endpoint::Search,
        Endpoint::Filter,
        Endpoint::TopDirectors,
        Endpoint::TopGenres,
        Endpoint::StatsCategories,
        Endpoint::StatsYearly,
    ];

    pub fn metric_name(&self) -> &'static str {
        match self {
            Endpoint::ListShows => LATENCY_LIST_SHOWS,
            Endpoint::SingleShow => LATENCY_SINGLE_SHOW,
            Endpoint::Search => LATENCY_SEARCH,
            Endpoint::Filter => LATENCY_FILTER,
            Endpoint::TopDirectors => LATENCY_TOP_DIRECTORS,
            Endpoint::TopGenres => LATENCY_TOP_GENRES,
            Endpoint::StatsCategories => LATENCY_STATS_CATEGORIES,
            Endpoint::StatsYearly => LATENCY_STATS_YEARLY,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::ListShows => "List shows",
            Endpoint::SingleShow => "Single show",
            Endpoint::Search => "Search",
            Endpoint::Filter => "Filter",
            Endpoint::TopDirectors => "Top directors",
            Endpoint::TopGenres => "Top genres",
            Endpoint::StatsCategories => "Stats categories",
            Endpoint::StatsYearly => "Stats yearly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub endpoint: Endpoint,
    pub url: Url,
}

/// Uniform pick from `choices`; `None` only when it is empty.
pub fn draw<'a, T, R: Rng + ?Sized>(rng: &mut R, choices: &'a [T]) -> Option<&'a T> {
    choices.choose(rng)
}

/// The eight requests of one iteration, with fresh random parameters.
pub fn plan_iteration<R: Rng + ?Sized>(
    rng: &mut R,
    base: &Url,
    scenario: &ScenarioConfig,
) -> Vec<PlannedRequest> {
    let page = rng.gen_range(1..=scenario.max_page).to_string();
    let show_id = rng.gen_range(1..=scenario.max_show_id).to_string();
    let term = draw(rng, &scenario.search_terms)
        .map(String::as_str)
        .unwrap_or_default();
    let filter = draw(rng, &scenario.filters)
        .map(String::as_str)
        .unwrap_or_default();
    let page_size = scenario.page_size.to_string();
    let top_n = scenario.top_n.to_string();

    Endpoint::ALL
        .iter()
        .map(|endpoint| {
            let url = match endpoint {
                Endpoint::ListShows => endpoint_url(
                    base,
                    &["shows"],
                    &[("page", page.as_str()), ("per_page", page_size.as_str())],
                ),
                Endpoint::SingleShow => endpoint_url(base, &["shows", show_id.as_str()], &[]),
                Endpoint::Search => endpoint_url(base, &["shows", "search"], &[("q", term)]),
                Endpoint::Filter => {
                    let mut url = endpoint_url(base, &["shows", "filter"], &[]);
                    url.set_query(Some(filter));
                    url
                }
                Endpoint::TopDirectors => {
                    endpoint_url(base, &["shows", "top-directors"], &[("n", top_n.as_str())])
                }
                Endpoint::TopGenres => endpoint_url(base, &["shows", "top-genres"], &[("n", top_n.as_str())]),
                Endpoint::StatsCategories => {
                    endpoint_url(base, &["shows", "stats", "categories"], &[])
                }
                Endpoint::StatsYearly => endpoint_url(base, &["shows", "stats", "yearly"], &[]),
            };
            PlannedRequest {
                endpoint: *endpoint,
                url,
            }
        })
        .collect()
}

fn endpoint_url(base: &Url, segments: &[&str], query: &[(&str, &str)]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url
}

/// Stop signal the scheduler holds for each running virtual user.
#[derive(Debug, Default)]
pub struct VuHandle {
    stop: AtomicBool,
    wake: Notify,
}

impl VuHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The user finishes its current iteration, then exits. A pause in
    /// progress is cut short.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub struct VuContext {
    pub id: u64,
    pub client: Arc<HttpsClient>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<DslConfig>,
    pub base: Arc<Url>,
}

pub async fn run_vu(ctx: VuContext, handle: Arc<VuHandle>) {
    let mut rng = match ctx.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ctx.id)),
        None => StdRng::from_entropy(),
    };
    let max_duration = ctx.config.request_timeout();
    let headers = ctx.config.headers.as_ref();

    tracing::debug!(vu = ctx.id, "virtual user started");

    while !handle.is_stopped() {
        let iteration_start = Instant::now();
        let plan = plan_iteration(&mut rng, &ctx.base, &ctx.config.scenario);
        for request in &plan {
            make_request(
                &ctx.client,
                &ctx.metrics,
                &request.url,
                request.endpoint.metric_name(),
                headers,
                max_duration,
            )
            .await;
        }
        ctx.metrics.add_counter(ITERATIONS, 1);
        ctx.metrics.add_trend(
            ITERATION_DURATION,
            iteration_start.elapsed().as_secs_f64() * 1000.0,
        );

        tokio::select! {
            _ = sleep(ctx.config.scenario.pause) => {}
            _ = handle.wake.notified() => {}
        }
    }

    tracing::debug!(vu = ctx.id, "virtual user stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:8000/netflix").unwrap()
    }

    #[test]
    fn plan_follows_fixed_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = plan_iteration(&mut rng, &base(), &ScenarioConfig::default());

        let endpoints: Vec<_> = plan.iter().map(|r| r.endpoint).collect();
        assert_eq!(endpoints, Endpoint::ALL.to_vec());

        assert_eq!(
            plan[4].url.as_str(),
            "http://127.0.0.1:8000/netflix/shows/top-directors?n=10"
        );
        assert_eq!(
            plan[5].url.as_str(),
            "http://127.0.0.1:8000/netflix/shows/top-genres?n=10"
        );
        assert_eq!(
            plan[6].url.as_str(),
            "http://127.0.0.1:8000/netflix/shows/stats/categories"
        );
        assert_eq!(
            plan[7].url.as_str(),
            "http://127.0.0.1:8000/netflix/shows/stats/yearly"
        );
    }

    #[test]
    fn random_parameters_stay_in_range() {
        let scenario = ScenarioConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let plan = plan_iteration(&mut rng, &base(), &scenario);

            let list = &plan[0].url;
            assert_eq!(list.path(), "/netflix/shows");
            let pairs: Vec<(String, String)> = list.query_pairs().into_owned().collect();
            assert_eq!(pairs[1], ("per_page".to_string(), "20".to_string()));
            let page: u32 = pairs[0].1.parse().unwrap();
            assert!((1..=5).contains(&page));

            let id: u32 = plan[1]
                .url
                .path_segments()
                .and_then(|s| s.last())
                .unwrap()
                .parse()
                .unwrap();
            assert!((1..=500).contains(&id));

            let (key, term) = plan[2].url.query_pairs().next().unwrap();
            assert_eq!(key, "q");
            assert!(scenario.search_terms.iter().any(|t| *t == term));

            assert_eq!(plan[3].url.path(), "/netflix/shows/filter");
            let filter = plan[3].url.query().unwrap();
            assert!(scenario.filters.iter().any(|f| f == filter));
        }
    }

    #[test]
    fn same_seed_same_plan() {
        let scenario = ScenarioConfig::default();
        let a = plan_iteration(&mut StdRng::seed_from_u64(3), &base(), &scenario);
        let b = plan_iteration(&mut StdRng::seed_from_u64(3), &base(), &scenario);
        assert_eq!(a, b);
    }

    #[test]
    fn search_terms_are_encoded() {
        let scenario = ScenarioConfig {
            search_terms: vec!["dark night".to_string()],
            ..ScenarioConfig::default()
        };
        let plan = plan_iteration(&mut StdRng::seed_from_u64(1), &base(), &scenario);
        assert_eq!(
            plan[2].url.as_str(),
            "http://127.0.0.1:8000/netflix/shows/search?q=dark+night"
        );
    }

    #[test]
    fn draw_covers_every_choice() {
        let choices = ["a", "b", "c"];
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            seen.insert(*draw(&mut rng, &choices).unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert!(draw::<&str, _>(&mut rng, &[]).is_none());
    }

    #[test]
    fn endpoints_report_to_registered_trends() {
        use crate::models::metrics::{metric_catalog, MetricKind, LATENCY_TRENDS};

        let names: Vec<_> = Endpoint::ALL.iter().map(|e| e.metric_name()).collect();
        assert_eq!(names, LATENCY_TRENDS.to_vec());

        let catalog = metric_catalog();
        for name in names {
            assert_eq!(catalog.get(name).map(|(kind, _)| *kind), Some(MetricKind::Trend));
        }
    }

    #[test]
    fn stop_is_sticky() {
        let handle = VuHandle::new();
        assert!(!handle.is_stopped());
        handle.stop();
        assert!(handle.is_stopped());
    }
}
