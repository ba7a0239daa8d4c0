//! Signup flow driven the way a navigation layer would.
//!
//! Demonstrates:
//! - Inline password strength feedback from `commit_field`
//! - A rejected advance keeping the user on the current step
//! - Handing the completed payload to a retrying sink

use async_trait::async_trait;
use ayumi::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// Fails once, then accepts, to exercise the retry path.
#[derive(Debug, Default)]
struct ConsoleSink {
    calls: AtomicU32,
}

#[async_trait]
impl SubmissionSink for ConsoleSink {
    async fn submit(
        &self,
        kind: FlowKind,
        payload: &Payload,
    ) -> Result<SubmissionId, SubmissionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SubmissionError::Unavailable("warming up".to_string()));
        }
        for (name, value) in payload.iter() {
            println!("  {} = {:?}", name, value);
        }
        Ok(SubmissionId::new(format!("{}-0001", kind)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut flow = FlowController::start(FlowKind::Signup, &FlowCatalog::default())?;

    flow.commit_field("firstName", "Ada")?;
    flow.commit_field("lastName", "Lovelace")?;
    flow.commit_field("email", "ada@example.com")?;
    flow.advance()?;

    for attempt in ["weak", "weakpass", "Str0ng!ab"] {
        let result = flow.commit_field("password", attempt)?;
        println!(
            "password {:?}: strength {:?}, criteria {:?}",
            attempt,
            result.strength(),
            result.criteria
        );
        match flow.advance() {
            Ok(advance) => {
                println!("advanced: {:?}", advance);
                break;
            }
            Err(e) => println!("still on step: {}", e),
        }
    }

    flow.commit_field("emailVerificationCode", "123456")?;
    let payload = match flow.advance()? {
        Advance::Completed(payload) => payload,
        Advance::Step(step) => return Err(format!("unexpected step {}", step).into()),
    };

    let sink = RetryingSink::new(
        ConsoleSink::default(),
        SubmissionConfig {
            timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::exponential(3, Duration::from_millis(50)),
        },
    );
    let id = submit_completed(&sink, flow.kind(), payload).await?;
    println!("Signup submitted as {}", id);

    Ok(())
}
