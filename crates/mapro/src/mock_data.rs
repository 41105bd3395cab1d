use chrono::{Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;

use mapro_core::registry::{
    Account, Business, Citizen, Household, Infrastructure, PermissionGrant, PermissionName, Role,
    Sitio,
};
use mapro_core::storage::{AccountRepository, EntityStore, RepositoryError, Result};

/// Seed used by the binary so demo output is reproducible.
pub const DEMO_SEED: u64 = 2024;

const SITIOS: &[&str] = &["Centro", "Ilaya", "Ibaba", "Riverside", "Bukid"];
const FIRST_NAMES: &[&str] = &[
    "Maria", "Jose", "Ana", "Juan", "Rosa", "Pedro", "Liza", "Ramon", "Carmen", "Miguel",
];
const LAST_NAMES: &[&str] = &[
    "Santos", "Reyes", "Cruz", "Bautista", "Garcia", "Mendoza", "Torres", "Flores",
];
const BUSINESSES: &[(&str, &str)] = &[
    ("Aling Nena Sari-Sari Store", "Nena Garcia"),
    ("Kuya Ben Vulcanizing", "Benjamin Cruz"),
    ("Mang Tomas Bakery", "Tomas Reyes"),
];
const INFRASTRUCTURES: &[(&str, &str)] = &[
    ("Barangay Health Center", "health"),
    ("Covered Court", "recreation"),
    ("Day Care Center", "education"),
    ("Water Pump Station", "utility"),
];

/// What [`seed_demo_registry`] created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub accounts: usize,
    pub sitios: usize,
    pub households: usize,
    pub citizens: usize,
    pub businesses: usize,
    pub infrastructures: usize,
    pub grants: usize,
}

/// Populates a small demo registry.
///
/// Writes go through the given stores, so passing the cache-invalidating
/// decorators keeps any cached aggregate consistent. The same `seed` always
/// produces the same records, apart from IDs and timestamps.
pub async fn seed_demo_registry(
    store: &dyn EntityStore,
    accounts: &dyn AccountRepository,
    seed: u64,
) -> Result<SeedSummary> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut summary = SeedSummary::default();
    let now = Utc::now();

    let admin = Account::new("admin", Role::Admin);
    let encoder = Account::new("encoder", Role::Encoder);
    let viewer = Account::new("viewer", Role::Viewer);
    for account in [&admin, &encoder, &viewer] {
        accounts.create_account(account).await?;
        summary.accounts += 1;
    }

    for (account, permissions) in [
        (&admin, &["admin.all", "citizens.edit", "citizens.view"][..]),
        (&encoder, &["citizens.edit", "citizens.view"][..]),
        (&viewer, &["citizens.view"][..]),
    ] {
        for permission in permissions {
            let permission = PermissionName::parse(*permission)
                .map_err(|e| RepositoryError::validation("PermissionGrant", e))?;
            store
                .create(PermissionGrant::new(account.id, permission).into())
                .await?;
            summary.grants += 1;
        }
    }

    for name in SITIOS {
        let sitio = Sitio::new(*name);
        let sitio_id = sitio.meta.id;
        store.create(sitio.into()).await?;
        summary.sitios += 1;

        let households = rng.random_range(1..=3);
        for _ in 0..households {
            let number = format!("{}-{:03}", &name[..3].to_uppercase(), summary.households + 1);
            let household = Household::new(number, sitio_id);
            let household_id = household.meta.id;
            store.create(household.into()).await?;
            summary.households += 1;

            let members = rng.random_range(1..=4);
            for _ in 0..members {
                let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
                let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
                let days_ago: i64 = rng.random_range(0..30);
                let minutes_ago: i64 = rng.random_range(0..24 * 60);
                let citizen = Citizen::new(first, last)
                    .with_household(household_id)
                    .with_date_encoded(
                        now - Duration::days(days_ago) - Duration::minutes(minutes_ago),
                    );
                store.create(citizen.into()).await?;
                summary.citizens += 1;
            }
        }
    }

    for (name, owner) in BUSINESSES {
        store
            .create(Business::new(*name, *owner, encoder.id).into())
            .await?;
        summary.businesses += 1;
    }

    for (name, category) in INFRASTRUCTURES {
        store
            .create(Infrastructure::new(*name, *category).into())
            .await?;
        summary.infrastructures += 1;
    }

    tracing::info!(
        citizens = summary.citizens,
        households = summary.households,
        sitios = summary.sitios,
        "Seeded demo registry"
    );

    Ok(summary)
}
