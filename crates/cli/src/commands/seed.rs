use atlas_db::{DemoPortfolio, SeedResult, VerificationResult};

use crate::commands::{async_runtime, load_config, migrated_pool, CommandResult, StepFailure};

pub fn run(reset: bool) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        if reset {
            DemoPortfolio::clean(&pool)
                .await
                .map_err(|error| ("seed_cleanup", error.to_string(), 5u8))?;
        }
        let seeded = DemoPortfolio::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoPortfolio::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;
        verified(seeded, &verification)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verified(
    seeded: SeedResult,
    verification: &VerificationResult,
) -> Result<SeedResult, StepFailure> {
    if verification.all_present {
        return Ok(seeded);
    }
    Err(("seed_verification", verification_message(&verification.checks), 6u8))
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo portfolio loaded: {} projects, {} contractors, {} communications, {} meetings",
        seeded.projects, seeded.contractors, seeded.communications, seeded.meetings
    )
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("projects", true), ("financial-metrics", false), ("meetings", false)];

        assert_eq!(
            verification_message(&checks),
            "Seed verification failed for checks: financial-metrics, meetings"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
