//! End-to-end scenarios for the argocd-update step using Cucumber.
//!
//! Scenarios run against the in-memory Application client, so no cluster is
//! needed:
//!
//! ```bash
//! cargo test --test scenarios --features test-utils
//! ```

mod steps;

use cucumber::World;
use steps::ArgoCdUpdateWorld;

#[tokio::main]
async fn main() {
    ArgoCdUpdateWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit("tests/scenarios/features/argocd_update.feature")
        .await;
}
