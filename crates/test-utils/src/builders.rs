#![allow(dead_code)]

use perfbisect::bisect::{BisectionOptions, create_graph};
use perfbisect::graph::{
    AnalysisOptions, BuildOptions, Change, Commit, Dependency, Dimension, FindIsolateInput,
    FindIsolateOutput, FindIsolatePayload, GraphJsonOptions, HistogramOptions, ReadOptions,
    TaskGraph, TaskPayload, TaskVertex, TestOptions,
};
use perfbisect::store::{JobId, MemoryTaskStore, TaskStore};
use perfbisect::types::ReadMode;

pub const REPOSITORY: &str = "chromium";

pub fn commit_hash(index: usize) -> String {
    format!("commit_{index}")
}

/// `chromium@commit_<index>`.
pub fn change(index: usize) -> Change {
    Change::from_commit(Commit::new(REPOSITORY, commit_hash(index)))
}

/// Builder for `BisectionOptions` over `commit_<start>..commit_<end>`.
pub struct BisectionOptionsBuilder {
    options: BisectionOptions,
}

impl BisectionOptionsBuilder {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            options: BisectionOptions {
                start_change: change(start),
                end_change: change(end),
                analysis: AnalysisOptions::default(),
                build: BuildOptions {
                    builder: "linux-perf".to_string(),
                    target: "performance_test_suite".to_string(),
                    bucket: "try".to_string(),
                },
                test: TestOptions {
                    dimensions: Vec::new(),
                    extra_args: Vec::new(),
                    execution_timeout_secs: 2700,
                },
                read: ReadOptions {
                    benchmark: "speedometer2".to_string(),
                    mode: ReadMode::HistogramSets,
                    results_filename: "perf_results.json".to_string(),
                    histogram: HistogramOptions {
                        histogram_name: Some("RunsPerMinute".to_string()),
                        ..HistogramOptions::default()
                    },
                    graph_json: GraphJsonOptions::default(),
                },
            },
        }
    }

    pub fn min_attempts(mut self, n: u32) -> Self {
        self.options.analysis.min_attempts = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.options.analysis.max_attempts = n;
        self
    }

    pub fn magnitude(mut self, magnitude: f64) -> Self {
        self.options.analysis.comparison_magnitude = magnitude;
        self
    }

    pub fn dimension(mut self, key: &str, value: &str) -> Self {
        self.options.test.dimensions.push(Dimension {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn read(mut self, read: ReadOptions) -> Self {
        self.options.read = read;
        self
    }

    pub fn build(self) -> BisectionOptions {
        self.options
    }
}

/// Minimal payload for engine/store tests that do not care about the domain.
pub fn plain_payload(id: &str) -> TaskPayload {
    TaskPayload::FindIsolate(FindIsolatePayload {
        input: FindIsolateInput {
            change: Change::from_commit(Commit::new(REPOSITORY, id)),
            build: BuildOptions {
                builder: "b".to_string(),
                target: "t".to_string(),
                bucket: String::new(),
            },
        },
        output: FindIsolateOutput::default(),
        errors: Vec::new(),
    })
}

pub fn plain_vertex(id: &str) -> TaskVertex {
    TaskVertex::new(id, plain_payload(id))
}

/// Builder for small generic graphs: `edge(a, b)` means `a` depends on `b`.
#[derive(Default)]
pub struct GraphBuilder {
    vertices: Vec<TaskVertex>,
    edges: Vec<Dependency>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, id: &str) -> Self {
        self.vertices.push(plain_vertex(id));
        self
    }

    pub fn vertex(mut self, vertex: TaskVertex) -> Self {
        self.vertices.push(vertex);
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push(Dependency::new(from, to));
        self
    }

    pub fn parts(self) -> (Vec<TaskVertex>, Vec<Dependency>) {
        (self.vertices, self.edges)
    }

    pub fn build(self) -> TaskGraph {
        TaskGraph::from_parts(self.vertices, self.edges).expect("valid test graph")
    }
}

/// A memory store holding `graph` under job `test-job`.
pub fn populated_store(graph: TaskGraph) -> (MemoryTaskStore, JobId) {
    let store = MemoryTaskStore::new();
    let job = JobId::parse("test-job").expect("valid job id");
    store.populate(&job, graph).expect("populate");
    (store, job)
}

/// Bisection graph with two attempts per endpoint: 2 find_isolate,
/// 4 run_test, 4 read_value and 1 find_culprit vertices.
pub fn two_attempt_bisection_graph() -> TaskGraph {
    let options = BisectionOptionsBuilder::new(0, 5).min_attempts(2).build();
    create_graph(&options).expect("valid bisection graph")
}

/// Histogram-set result file with one histogram holding `samples`.
pub fn histogram_results(name: &str, samples: &[f64]) -> String {
    serde_json::json!([
        {
            "name": name,
            "unit": "count",
            "sampleValues": samples,
            "diagnostics": {}
        }
    ])
    .to_string()
}
