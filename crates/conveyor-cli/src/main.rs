//! Demo binary: drives every scheduling mode against simulated
//! image-resize executors.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use conveyor_core::{
    Constraints, ExecutionOutcome, ForegroundToken, Notifier, Payload, Priority, ProgressReporter,
    RetryPolicy, SchedulerBuilder, StopSignal, TaskDefinition, TaskExecutor, TaskId,
};

/// Simulated resize: walks progress up in 10% steps, then reports the
/// output path. Honors its stop signal between steps.
struct ResizeExecutor;

#[async_trait]
impl TaskExecutor for ResizeExecutor {
    async fn run(
        &self,
        input: &Payload,
        progress: ProgressReporter,
        stop: StopSignal,
    ) -> ExecutionOutcome {
        let Some(image_id) = input.get_i64("image_id") else {
            return ExecutionOutcome::Failure("missing image_id".to_string());
        };

        for step in (0..=100u8).step_by(10) {
            if stop.is_stopped() {
                return ExecutionOutcome::Failure("stopped".to_string());
            }
            progress.report(step);
            sleep(Duration::from_millis(40)).await;
        }

        ExecutionOutcome::Success(Payload::from_pairs([(
            "resized_path",
            serde_json::json!(format!("/images/resized/{image_id}.png")),
        )]))
    }
}

/// Second chain link: "syncs" the resized image to the gallery. Reads
/// the path the resize step produced (it arrives merged into our input).
struct GallerySyncExecutor;

#[async_trait]
impl TaskExecutor for GallerySyncExecutor {
    async fn run(
        &self,
        input: &Payload,
        _progress: ProgressReporter,
        _stop: StopSignal,
    ) -> ExecutionOutcome {
        let Some(path) = input.get_str("resized_path") else {
            return ExecutionOutcome::Failure("nothing to sync".to_string());
        };
        sleep(Duration::from_millis(100)).await;
        ExecutionOutcome::Success(Payload::from_pairs([(
            "synced",
            serde_json::json!(path),
        )]))
    }
}

/// Fails a configured number of times before succeeding, so the retry
/// path has something to chew on.
struct FlakyResizeExecutor {
    remaining_failures: AtomicU32,
}

impl FlakyResizeExecutor {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TaskExecutor for FlakyResizeExecutor {
    async fn run(
        &self,
        _input: &Payload,
        _progress: ProgressReporter,
        _stop: StopSignal,
    ) -> ExecutionOutcome {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return ExecutionOutcome::Retry;
        }
        ExecutionOutcome::Success(Payload::from_pairs([(
            "resized_path",
            serde_json::json!("/images/resized/flaky.png"),
        )]))
    }
}

/// Notifier that prints to the terminal, standing in for the platform
/// notification surface.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, text: &str) {
        println!("  [notification] {text}");
    }

    fn foreground_affordance(&self, task_id: TaskId) -> ForegroundToken {
        println!("  [notification] ongoing status shown for {task_id}");
        ForegroundToken::new(task_id.as_ulid().timestamp_ms())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_core=info".into()),
        )
        .init();

    // (A) conditions we can flip mid-demo, and a scheduler wired to the
    // simulated executors
    let conditions = conveyor_core::SharedConditions::default();
    let scheduler = SchedulerBuilder::new()
        .executor("image.resize", Arc::new(ResizeExecutor))
        .expect("register resize")
        .executor("image.sync", Arc::new(GallerySyncExecutor))
        .expect("register sync")
        .executor("image.resize.flaky", Arc::new(FlakyResizeExecutor::new(2)))
        .expect("register flaky")
        .conditions(Arc::new(conditions.clone()))
        .notifier(Arc::new(ConsoleNotifier))
        .start();

    // (B) one-shot resize, observing state and progress as it runs
    println!("-- one-shot resize with progress --");
    let id = scheduler
        .submit(
            TaskDefinition::new("image.resize")
                .with_input(Payload::from_pairs([("image_id", serde_json::json!(42))])),
        )
        .await
        .expect("submit");
    let mut updates = scheduler.observe(id).await.expect("observe");
    while let Some(update) = updates.next().await {
        println!("  {:?} {}%", update.state, update.progress);
        if let Some(output) = update.output {
            println!("  output: {:?}", output.get_str("resized_path"));
        }
    }

    // (C) chained work: resize, then sync the result to the gallery
    println!("-- chained resize -> gallery sync --");
    let resize = scheduler
        .submit(
            TaskDefinition::new("image.resize")
                .with_input(Payload::from_pairs([("image_id", serde_json::json!(7))])),
        )
        .await
        .expect("submit resize");
    let sync = scheduler
        .submit(TaskDefinition::new("image.sync").after(resize))
        .await
        .expect("submit sync");
    let last = scheduler
        .observe(sync)
        .await
        .expect("observe")
        .last()
        .await
        .expect("final update");
    println!(
        "  chain finished: {:?}, synced={:?}",
        last.state,
        last.output.and_then(|o| o.get_str("synced").map(String::from))
    );

    // (D) retrying work: fails twice, backs off, then succeeds
    println!("-- retrying resize (fails twice first) --");
    let flaky = scheduler
        .submit(
            TaskDefinition::new("image.resize.flaky").with_retry_policy(
                RetryPolicy::linear(Duration::from_millis(500)).with_max_attempts(5),
            ),
        )
        .await
        .expect("submit flaky");
    let mut updates = scheduler.observe(flaky).await.expect("observe");
    while let Some(update) = updates.next().await {
        println!("  {:?}", update.state);
    }
    let record = scheduler.status(flaky).await.expect("status");
    println!("  took {} attempts", record.attempt_count);

    // (E) constrained work: waits for charging, dispatches when plugged in
    println!("-- constrained resize (requires charging) --");
    conditions.update(|c| c.charging = false);
    scheduler.conditions_changed();
    let constrained = scheduler
        .submit(
            TaskDefinition::new("image.resize")
                .with_input(Payload::from_pairs([("image_id", serde_json::json!(13))]))
                .with_constraints(Constraints::none().charging()),
        )
        .await
        .expect("submit constrained");
    sleep(Duration::from_millis(300)).await;
    println!(
        "  while unplugged: {:?}",
        scheduler.status(constrained).await.expect("status").state
    );
    println!("  plugging in...");
    conditions.update(|c| c.charging = true);
    scheduler.conditions_changed();
    let last = scheduler
        .observe(constrained)
        .await
        .expect("observe")
        .last()
        .await
        .expect("final update");
    println!("  after plugging in: {:?}", last.state);

    // (F) foreground work: the notifier surfaces an ongoing affordance
    // before the executor starts
    println!("-- foreground resize --");
    let foreground = scheduler
        .submit(
            TaskDefinition::new("image.resize")
                .with_input(Payload::from_pairs([("image_id", serde_json::json!(99))]))
                .with_priority(Priority::Foreground),
        )
        .await
        .expect("submit foreground");
    scheduler.observe(foreground).await.expect("observe").last().await;

    // (G) periodic work: two cycles, then cancel
    println!("-- periodic resize (2s interval, 1s flex) --");
    let periodic = scheduler
        .submit(
            TaskDefinition::new("image.resize")
                .with_input(Payload::from_pairs([("image_id", serde_json::json!(5))]))
                .periodic(Duration::from_secs(2), Duration::from_secs(1)),
        )
        .await
        .expect("submit periodic");
    sleep(Duration::from_millis(3500)).await;
    scheduler.cancel(periodic).await.expect("cancel periodic");
    println!("  periodic task cancelled");

    scheduler.shutdown().await;
    println!("done");
}
