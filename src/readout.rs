//! The resolver-and-injector.
//!
//! A page goes through three stages:
//!
//! 1. [`Readout::plan`] finds the leaf annotated elements and computes each
//!    one's fetch path (synchronous, over the parsed tree).
//! 2. [`Readout::resolve`] fetches and renders every path as an independent
//!    task; all fetches of a page are in flight together and may finish in
//!    any order.
//! 3. [`apply`] writes each outcome into its element. Failures leave the
//!    element as it was.
//!
//! [`Readout::process`] runs all three over a serialized page.

use std::collections::HashMap;
use std::sync::Arc;

use kuchikiki::NodeRef;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dom;
use crate::error::ReadoutError;
use crate::loader::Loader;
use crate::markdown::{self, RenderOptions};
use crate::namespace::Namespace;
use crate::tree::{self, Element};

/// One leaf to fetch. `index` is the leaf's position in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub path: String,
}

/// Rendered HTML for a leaf, or why there is none.
pub type Outcome = Result<String, ReadoutError>;

#[derive(Debug)]
pub struct Failure {
    pub path: String,
    pub error: ReadoutError,
}

/// What happened to the leaves of one page.
#[derive(Debug, Default)]
pub struct Report {
    pub resolved: usize,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Readout {
    namespace: Namespace,
    loader: Arc<dyn Loader>,
    render: RenderOptions,
}

impl Readout {
    pub fn new(namespace: Namespace, loader: Arc<dyn Loader>, render: RenderOptions) -> Self {
        Self {
            namespace,
            loader,
            render,
        }
    }

    /// Leaf annotated elements under `root` and their fetch paths.
    pub fn plan<E: Element>(&self, root: &E) -> Vec<Job> {
        let jobs: Vec<Job> = tree::leaves(root, &self.namespace)
            .iter()
            .enumerate()
            .map(|(index, leaf)| Job {
                index,
                path: tree::fetch_path(leaf, &self.namespace),
            })
            .collect();
        info!(
            selector = %self.namespace.selector(),
            leaves = jobs.len(),
            "planned includes"
        );
        jobs
    }

    /// Fetch and render every job concurrently.
    ///
    /// The returned outcomes line up with `jobs` by position; `Job::index`
    /// is not consulted.
    pub async fn resolve(&self, jobs: &[Job]) -> Vec<Outcome> {
        let mut set = JoinSet::new();
        let mut slot_of = HashMap::with_capacity(jobs.len());
        for (slot, job) in jobs.iter().enumerate() {
            let loader = Arc::clone(&self.loader);
            let render = self.render;
            let path = job.path.clone();
            let handle = set.spawn(async move {
                debug!(%path, "fetch start");
                loader.load(&path).await.map(|body| {
                    let html = markdown::render_markdown(&body, render);
                    debug!(%path, bytes = body.len(), html_bytes = html.len(), "rendered");
                    html
                })
            });
            slot_of.insert(handle.id(), slot);
        }

        let mut slots: Vec<Option<Outcome>> = jobs.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    if let Some(&slot) = slot_of.get(&id) {
                        slots[slot] = Some(outcome);
                    }
                }
                Err(e) => {
                    let path = slot_of.get(&e.id()).map(|&slot| jobs[slot].path.as_str());
                    warn!(path = path.unwrap_or("?"), error = %e, "fetch task failed");
                }
            }
        }

        jobs.iter()
            .zip(slots)
            .map(|(job, slot)| {
                slot.unwrap_or_else(|| {
                    Err(ReadoutError::Task {
                        path: job.path.clone(),
                    })
                })
            })
            .collect()
    }

    /// Resolve every include in a serialized page.
    ///
    /// Per-leaf failures are logged and collected in the [`Report`]; only a
    /// serialization failure is returned as an error. A page with no leaves
    /// is returned byte-for-byte.
    pub async fn process(&self, html: &str) -> Result<(String, Report), ReadoutError> {
        // The parsed tree is not Send, so it is rebuilt after the fetches
        // instead of being held across the await. Parsing is deterministic, so
        // leaf order is the same both times.
        let jobs = self.plan(&dom::parse_document(html));
        if jobs.is_empty() {
            return Ok((html.to_owned(), Report::default()));
        }

        let outcomes = self.resolve(&jobs).await;

        let document = dom::parse_document(html);
        let leaves = tree::leaves(&document, &self.namespace);
        let mut report = Report::default();
        for ((leaf, job), outcome) in leaves.iter().zip(&jobs).zip(outcomes) {
            if apply(leaf, &outcome) {
                report.resolved += 1;
            } else if let Err(error) = outcome {
                warn!(path = %job.path, %error, "include failed, element left unchanged");
                report.failures.push(Failure {
                    path: job.path.clone(),
                    error,
                });
            }
        }
        info!(
            resolved = report.resolved,
            failed = report.failures.len(),
            "includes applied"
        );

        Ok((dom::serialize(&document)?, report))
    }
}

/// Write one outcome into its element. Returns whether the element changed.
pub fn apply(element: &NodeRef, outcome: &Outcome) -> bool {
    match outcome {
        Ok(html) => {
            dom::replace_children_with_html(element, html);
            true
        }
        Err(_) => false,
    }
}
