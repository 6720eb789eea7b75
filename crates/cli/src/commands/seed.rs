use vinoteka_db::{DemoCatalog, VerificationResult};

use crate::commands::{with_database, CommandResult, Failure};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedOptions {
    /// Only check that the demo rows exist.
    pub verify_only: bool,
    /// Remove the demo rows instead of loading them.
    pub clean: bool,
}

pub fn run() -> CommandResult {
    run_with(SeedOptions::default())
}

pub fn run_with(options: SeedOptions) -> CommandResult {
    let result = with_database(|_, pool| async move {
        if options.clean {
            let removed = DemoCatalog::clean(&pool)
                .await
                .map_err(|error| ("seed_clean", error.to_string(), 6u8))?;
            return Ok(format!("demo catalog removed ({removed} rows deleted)"));
        }

        if options.verify_only {
            let verification = DemoCatalog::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            check_verification(&verification)?;
            return Ok("demo catalog verified".to_string());
        }

        let seeded = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        check_verification(&verification)?;

        let variant_lines: Vec<String> = seeded
            .variants_seeded
            .iter()
            .map(|variant| {
                format!("  - {} [{}]: {}", variant.variant_id, variant.product_id, variant.description)
            })
            .collect();
        Ok::<String, Failure>(format!(
            "demo catalog loaded: {} products, {} variants\n{}",
            seeded.products_seeded,
            seeded.variants_seeded.len(),
            variant_lines.join("\n")
        ))
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn check_verification(verification: &VerificationResult) -> Result<(), Failure> {
    if verification.all_present {
        return Ok(());
    }
    Err(("seed_verification", verification_message(&verification.checks), 6u8))
}

fn verification_message(checks: &[(&str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "some demo rows failed to load".to_string()
    } else {
        format!("demo catalog verification failed for: {}", failed_checks.join(", "))
    }
}
