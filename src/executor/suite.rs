//! Suite driver
//!
//! Opens every suite report, runs all pairs sequentially or on a bounded pool of
//! blocking workers, hands per-test reports back in submission order, then
//! finalizes and closes the suite reports.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::runner::{Outcome, RunError, TestRunner};
use crate::library::TestLibrary;
use crate::models::{Mask, SuiteTotals, TestPair};
use crate::report::{Report, ReportError, Subscription, TestStart};
use crate::utils::timer::Timer;

/// How rows are scheduled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Executor {
    /// One row at a time on the calling thread, output written directly
    #[default]
    Sequential,
    /// Up to `jobs` rows in flight, output buffered per row
    Pool { jobs: usize },
}

impl Executor {
    /// `0` and `1` mean sequential
    pub fn from_jobs(jobs: usize) -> Self {
        if jobs <= 1 {
            Executor::Sequential
        } else {
            Executor::Pool { jobs }
        }
    }
}

/// Errors ending a suite run
#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("Failed to open {sink} report: {source}")]
    Open {
        sink: &'static str,
        #[source]
        source: ReportError,
    },

    #[error("Test {index} ('{name}') crashed: {source}")]
    Crashed {
        index: usize,
        name: String,
        #[source]
        source: RunError,
    },

    #[error("{sink} report failed: {source}")]
    Report {
        sink: &'static str,
        #[source]
        source: ReportError,
    },
}

type Prepared<T> = (TestPair, Vec<T>);

/// Runs a whole suite against a set of subscribed reports
pub struct SuiteDriver<L: ?Sized> {
    runner: TestRunner<L>,
    executor: Executor,
}

impl<L: TestLibrary + ?Sized + 'static> SuiteDriver<L> {
    pub fn new(runner: TestRunner<L>, executor: Executor) -> Self {
        Self { runner, executor }
    }

    /// Run `pairs` in order. Suite reports opened here are always closed; they
    /// are finalized only when every row was handled.
    pub async fn run_suite<R, I>(
        &self,
        pairs: I,
        sinks: &mut [Subscription<R>],
    ) -> Result<SuiteTotals, SuiteError>
    where
        R: Report,
        I: IntoIterator<Item = TestPair>,
    {
        let timer = Timer::start("suite");
        info!(
            "Starting suite with {} report(s), executor {:?}",
            sinks.len(),
            self.executor
        );

        let mut opened = 0;
        let mut result = Ok(());
        for sub in sinks.iter_mut() {
            if let Err(source) = sub.report.open() {
                result = Err(SuiteError::Open {
                    sink: sub.report.name(),
                    source,
                });
                break;
            }
            opened += 1;
        }

        let result = match result {
            Ok(()) => self.execute(pairs, sinks).await,
            Err(e) => Err(e),
        };
        let result = result.and_then(|totals| {
            for sub in sinks.iter_mut() {
                let counts = totals.counts.masked(&sub.mask);
                sub.report
                    .finalize(&totals, &counts)
                    .map_err(|source| SuiteError::Report {
                        sink: sub.report.name(),
                        source,
                    })?;
            }
            Ok(totals)
        });

        let mut close_error = None;
        for sub in sinks[..opened].iter_mut().rev() {
            if let Err(source) = sub.report.close() {
                warn!("Failed to close {} report: {}", sub.report.name(), source);
                close_error.get_or_insert(SuiteError::Report {
                    sink: sub.report.name(),
                    source,
                });
            }
        }

        let totals = result?;
        if let Some(e) = close_error {
            return Err(e);
        }
        let wall = timer.stop();
        info!("Suite finished: {} in {:.3}s wall", totals, wall.as_secs_f64());
        Ok(totals)
    }

    async fn execute<R, I>(
        &self,
        pairs: I,
        sinks: &mut [Subscription<R>],
    ) -> Result<SuiteTotals, SuiteError>
    where
        R: Report,
        I: IntoIterator<Item = TestPair>,
    {
        let masks: Arc<[Mask]> = sinks.iter().map(|s| s.mask).collect();
        let mut totals = SuiteTotals::default();

        match self.executor {
            Executor::Sequential => {
                for pair in pairs {
                    let mut tests = self.start_tests(&pair, sinks, false)?;
                    let outcome = self.runner.run(&pair, &mut tests, &masks);
                    self.collect(&pair, tests, outcome, sinks, &mut totals, true)?;
                }
            }
            Executor::Pool { jobs } => {
                // Per-test reports are created up front so the stream never
                // borrows the suite reports the aggregator hands them back to
                let prepared = pairs
                    .into_iter()
                    .map(|pair| {
                        let tests = self.start_tests(&pair, sinks, true)?;
                        Ok((pair, tests))
                    })
                    .collect::<Result<Vec<Prepared<R::Test>>, SuiteError>>()?;
                debug!("Dispatching {} rows to {} workers", prepared.len(), jobs);

                let mut results = stream::iter(prepared)
                    .map(|(pair, mut tests)| {
                        let runner = self.runner.clone();
                        let masks = Arc::clone(&masks);
                        let fallback = pair.clone();
                        async move {
                            let handle = tokio::task::spawn_blocking(move || {
                                let outcome = runner.run(&pair, &mut tests, &masks);
                                (pair, tests, outcome)
                            });
                            handle.await.map_err(|e| (fallback, e))
                        }
                    })
                    .buffered(jobs);

                while let Some(joined) = results.next().await {
                    match joined {
                        Ok((pair, tests, outcome)) => {
                            self.collect(&pair, tests, outcome, sinks, &mut totals, false)?;
                        }
                        Err((pair, e)) => {
                            let outcome = Outcome::Crashed(RunError::Join(e.to_string()));
                            self.collect(&pair, Vec::new(), outcome, sinks, &mut totals, false)?;
                        }
                    }
                }
            }
        }

        Ok(totals)
    }

    fn start_tests<R: Report>(
        &self,
        pair: &TestPair,
        sinks: &[Subscription<R>],
        buffered: bool,
    ) -> Result<Vec<R::Test>, SuiteError> {
        let start = TestStart {
            index: pair.index,
            params: pair.params.clone(),
            info: self.runner.library().test_info(pair.index),
            buffered,
        };
        sinks
            .iter()
            .map(|sub| {
                sub.report
                    .start_test(&start)
                    .map_err(|source| SuiteError::Report {
                        sink: sub.report.name(),
                        source,
                    })
            })
            .collect()
    }

    /// Return per-test reports to their suites and fold the outcome into `totals`
    fn collect<R: Report>(
        &self,
        pair: &TestPair,
        tests: Vec<R::Test>,
        outcome: Outcome,
        sinks: &mut [Subscription<R>],
        totals: &mut SuiteTotals,
        abort_on_crash: bool,
    ) -> Result<(), SuiteError> {
        for (sub, test) in sinks.iter_mut().zip(tests) {
            sub.report
                .end_test(test)
                .map_err(|source| SuiteError::Report {
                    sink: sub.report.name(),
                    source,
                })?;
        }

        match outcome {
            Outcome::Completed(run) => {
                debug!(
                    "Test {} finished in {:.6}s with {:?}",
                    pair.index,
                    run.elapsed,
                    run.counts.as_array()
                );
                totals.record(&run);
                Ok(())
            }
            Outcome::Crashed(source) => {
                let name = self.runner.library().test_name(pair.index);
                totals.crashed += 1;
                error!("Test {} ('{}') crashed: {}", pair.index, name, source);
                if abort_on_crash {
                    Err(SuiteError::Crashed {
                        index: pair.index,
                        name,
                        source,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Abort, TestSuite};
    use crate::models::{Counts, Event, EventKind, Parameters, TestRun};
    use crate::report::{
        ColorPolicy, ConsoleReport, Destination, JUnitReport, MemoryBuffer, Sink, TestReport,
    };
    use serde_json::json;
    use std::sync::Mutex;

    fn library() -> Arc<TestSuite> {
        let mut suite = TestSuite::new();
        suite
            .test("math/add", |ctx, args| {
                let a = args[0].as_i64().unwrap_or(0);
                let b = args[1].as_i64().unwrap_or(0);
                ctx.comment("sum");
                ctx.equal(&(a + b), &3);
                ctx.print_out(&format!("{a}+{b}\n"));
                Ok(Some(json!(a + b)))
            })
            .arity(2)
            .pack(vec![json!(1), json!(2)])
            .pack(vec![json!(2), json!(2)]);
        suite.test("slow", |ctx, _| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            ctx.skip("later");
            Ok(None)
        });
        suite.test("aborts", |_, _| Err(Abort("setup".into()).into()));
        suite.test("timed", |ctx, _| {
            ctx.timing(0.5);
            Ok(None)
        });
        Arc::new(suite)
    }

    fn pairs() -> Vec<TestPair> {
        vec![
            TestPair::new(0, Parameters::Pack(0)),
            TestPair::new(1, Parameters::empty()),
            TestPair::new(0, Parameters::Pack(1)),
            TestPair::new(3, Parameters::empty()),
            TestPair::new(0, Parameters::Pack(0)),
        ]
    }

    fn console(memory: &MemoryBuffer) -> Subscription<Sink> {
        let report = ConsoleReport::new(Destination::Memory(memory.clone()))
            .with_color(ColorPolicy::Never);
        Subscription::new(Sink::from(report), Mask::all()).unwrap()
    }

    fn driver(executor: Executor) -> SuiteDriver<TestSuite> {
        SuiteDriver::new(TestRunner::new(library()).with_capture(true, true), executor)
    }

    #[test]
    fn test_executor_from_jobs() {
        assert_eq!(Executor::from_jobs(0), Executor::Sequential);
        assert_eq!(Executor::from_jobs(1), Executor::Sequential);
        assert_eq!(Executor::from_jobs(4), Executor::Pool { jobs: 4 });
    }

    #[tokio::test]
    async fn test_totals_sum_per_test_counts() {
        let memory = MemoryBuffer::new();
        let mut sinks = vec![console(&memory)];
        let totals = driver(Executor::Sequential)
            .run_suite(pairs(), &mut sinks)
            .await
            .unwrap();

        assert_eq!(totals.tests, 5);
        assert_eq!(totals.crashed, 0);
        // add(1,2) passes twice, add(2,2) fails once
        assert_eq!(totals.counts.as_array(), [1, 2, 0, 1, 1]);
        assert_eq!(totals.stdout, "1+2\n2+2\n1+2\n");
    }

    #[tokio::test]
    async fn test_pool_output_matches_sequential() {
        let sequential = MemoryBuffer::new();
        let mut sinks = vec![console(&sequential)];
        driver(Executor::Sequential)
            .run_suite(pairs(), &mut sinks)
            .await
            .unwrap();

        let pooled = MemoryBuffer::new();
        let mut sinks = vec![console(&pooled)];
        driver(Executor::Pool { jobs: 3 })
            .run_suite(pairs(), &mut sinks)
            .await
            .unwrap();

        assert!(!sequential.contents().is_empty());
        assert_eq!(sequential.contents(), pooled.contents());
    }

    #[tokio::test]
    async fn test_masked_sink_totals() {
        let memory = MemoryBuffer::new();
        let full = console(&memory);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        let junit = JUnitReport::new(Destination::parse(path.to_str().unwrap(), Default::default()), "s");
        let mut sinks = vec![
            full,
            Subscription::new(Sink::from(junit), Mask::problems()).unwrap(),
        ];
        driver(Executor::Pool { jobs: 2 })
            .run_suite(pairs(), &mut sinks)
            .await
            .unwrap();

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("tests=\"5\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("errors=\"0\""));
    }

    #[tokio::test]
    async fn test_sequential_crash_aborts_and_closes() {
        let memory = MemoryBuffer::new();
        let mut sinks = vec![console(&memory)];
        let pairs = vec![
            TestPair::new(3, Parameters::empty()),
            TestPair::new(2, Parameters::empty()),
            TestPair::new(3, Parameters::empty()),
        ];
        let err = driver(Executor::Sequential)
            .run_suite(pairs, &mut sinks)
            .await
            .unwrap_err();

        assert!(matches!(err, SuiteError::Crashed { index: 2, .. }));
        let text = memory.contents();
        assert_eq!(text.matches("Test 3 ").count(), 1);
        assert!(!text.contains("Total results"));
        assert!(text.ends_with(&format!("{}\n", "_".repeat(80))));
    }

    #[tokio::test]
    async fn test_pool_crash_is_counted() {
        let memory = MemoryBuffer::new();
        let mut sinks = vec![console(&memory)];
        let pairs = vec![
            TestPair::new(3, Parameters::empty()),
            TestPair::new(2, Parameters::empty()),
            TestPair::new(3, Parameters::empty()),
        ];
        let totals = driver(Executor::Pool { jobs: 2 })
            .run_suite(pairs, &mut sinks)
            .await
            .unwrap();

        assert_eq!(totals.tests, 2);
        assert_eq!(totals.crashed, 1);
        assert!(memory.contents().contains("Crashed: 1"));
    }

    /// Records the order of suite-level calls into a shared log
    struct Lifecycle {
        log: Arc<Mutex<Vec<String>>>,
        fail_open: bool,
    }

    struct LifecycleTest;

    impl TestReport for LifecycleTest {
        fn handle(&mut self, _event: &Event) -> Result<(), ReportError> {
            Ok(())
        }

        fn finalize(&mut self, _run: &TestRun, _counts: &Counts) -> Result<(), ReportError> {
            Ok(())
        }
    }

    impl Report for Lifecycle {
        type Test = LifecycleTest;

        fn name(&self) -> &'static str {
            "lifecycle"
        }

        fn open(&mut self) -> Result<(), ReportError> {
            if self.fail_open {
                return Err(ReportError::NotOpen("lifecycle"));
            }
            self.log.lock().unwrap().push("open".into());
            Ok(())
        }

        fn start_test(&self, _start: &TestStart) -> Result<LifecycleTest, ReportError> {
            Ok(LifecycleTest)
        }

        fn end_test(&mut self, _test: LifecycleTest) -> Result<(), ReportError> {
            self.log.lock().unwrap().push("test".into());
            Ok(())
        }

        fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("finalize {} {:?}", totals.tests, counts.as_array()));
            Ok(())
        }

        fn close(&mut self) -> Result<(), ReportError> {
            self.log.lock().unwrap().push("close".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_suite_lifecycle_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = Lifecycle {
            log: Arc::clone(&log),
            fail_open: false,
        };
        let mut sinks = vec![Subscription::new(report, Mask::none().with(EventKind::Timing)).unwrap()];
        driver(Executor::Sequential)
            .run_suite(vec![TestPair::new(3, Parameters::empty())], &mut sinks)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["open", "test", "finalize 1 [0, 0, 0, 1, 0]", "close"]
        );
    }

    #[tokio::test]
    async fn test_open_failure_closes_earlier_sinks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sinks = vec![
            Subscription::new(
                Lifecycle {
                    log: Arc::clone(&log),
                    fail_open: false,
                },
                Mask::all(),
            )
            .unwrap(),
            Subscription::new(
                Lifecycle {
                    log: Arc::clone(&log),
                    fail_open: true,
                },
                Mask::all(),
            )
            .unwrap(),
        ];
        let err = driver(Executor::Sequential)
            .run_suite(pairs(), &mut sinks)
            .await
            .unwrap_err();

        assert!(matches!(err, SuiteError::Open { sink: "lifecycle", .. }));
        assert_eq!(*log.lock().unwrap(), ["open", "close"]);
    }
}
