/*!
Générateur de parc synthétique

Produit des `DeviceRecord` réalistes pour les 4 types de machines
(ATM, CC, PD, PC) avec :
- codes machine `<préfixe 2 lettres><6 chiffres>`
- séquence d'acquisition = branche (5 chiffres) + date YYYYMMDD
- combinaisons modèle / fournisseur / OS / version cohérentes par type
- État brésilien, drapeau d'erreur (5%), dernier contact dans l'heure
*/

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use segwatch_kernel::clock::{format_timestamp, random_timestamp_between};
use segwatch_kernel::inventory::DeviceRecord;

pub const DEFAULT_ROWS: usize = 500;
pub const DEFAULT_OUTPUT: &str = "data_raw/synthetic_devices.csv";
pub const ERROR_PROBABILITY: f64 = 0.05;

/// Référentiel d'un type de machine
#[derive(Debug, Clone, Copy)]
pub struct MachineProfile {
    pub machine_type: &'static str,
    pub prefix: &'static str,
    pub models: &'static [&'static str],
    pub suppliers: &'static [&'static str],
    pub operating_system: &'static str,
    pub os_version_range: (f64, f64),
}

pub const PROFILES: [MachineProfile; 4] = [
    MachineProfile {
        machine_type: "ATM",
        prefix: "AT",
        models: &["ATMv17", "ATMv18", "ATMRv18", "ATMv22", "ATMRv22"],
        suppliers: &["Cool IT Supplier", "Best Supplier"],
        operating_system: "Ubuntu",
        os_version_range: (17.1, 22.5),
    },
    MachineProfile {
        machine_type: "CC",
        prefix: "CC",
        models: &["STR", "TRL", "MFR"],
        suppliers: &["Cool IT supplier", "Lespeed", "Meganet"],
        operating_system: "Ubuntu",
        os_version_range: (17.1, 22.6),
    },
    MachineProfile {
        machine_type: "PD",
        prefix: "PD",
        models: &["GH", "GHF", "TRH", "TRHF"],
        suppliers: &["Best Supplier", "Lespeed"],
        operating_system: "Ubuntu",
        os_version_range: (17.1, 22.7),
    },
    MachineProfile {
        machine_type: "PC",
        prefix: "PC",
        models: &["Motto2018", "Motto2019", "Bell2020", "Bell2021", "Bell2022"],
        suppliers: &["Motto", "Bell"],
        operating_system: "Windows",
        os_version_range: (35.0, 57.8),
    },
];

pub const BRAZILIAN_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR", "PE", "PI",
    "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

pub fn profile(machine_type: &str) -> Option<&'static MachineProfile> {
    PROFILES.iter().find(|p| p.machine_type == machine_type)
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &'a [&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

fn random_acquisition_date<R: Rng + ?Sized>(rng: &mut R) -> NaiveDate {
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default();
    let end = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap_or_default();
    let days = (end - start).num_days().max(0);
    start + Duration::days(rng.gen_range(0..=days))
}

fn random_ipv4<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "10.{}.{}.{}",
        rng.gen_range(0..=255u8),
        rng.gen_range(0..=255u8),
        rng.gen_range(1..=254u8)
    )
}

/// Une machine aléatoire, vue pour la dernière fois dans l'heure précédant `now`.
pub fn build_record<R: Rng + ?Sized>(rng: &mut R, now: NaiveDateTime) -> DeviceRecord {
    let profile = &PROFILES[rng.gen_range(0..PROFILES.len())];
    let branch_id = rng.gen_range(10000..=99999u32).to_string();
    let acquisition_date = random_acquisition_date(rng);
    let (low, high) = profile.os_version_range;
    let last_seen = random_timestamp_between(now - Duration::hours(1), now, rng);

    DeviceRecord {
        device_code: format!("{}{:06}", profile.prefix, rng.gen_range(0..=999_999u32)),
        acquisition_sequence: format!("{branch_id}{}", acquisition_date.format("%Y%m%d")),
        state: pick(rng, &BRAZILIAN_STATES).to_string(),
        has_error: rng.gen_bool(ERROR_PROBABILITY),
        machine_type: profile.machine_type.to_string(),
        machine_model: pick(rng, profile.models).to_string(),
        supplier: pick(rng, profile.suppliers).to_string(),
        network_address: random_ipv4(rng),
        operating_system: profile.operating_system.to_string(),
        os_version: format!("{:.1}", rng.gen_range(low..=high)),
        acquisition_date: acquisition_date.format("%Y-%m-%d").to_string(),
        last_connection_ts: format_timestamp(last_seen),
        branch_id,
    }
}

pub fn generate_records<R: Rng + ?Sized>(total: usize, rng: &mut R, now: NaiveDateTime) -> Vec<DeviceRecord> {
    (0..total).map(|_| build_record(rng, now)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use segwatch_kernel::clock::parse_timestamp;

    fn now() -> NaiveDateTime {
        parse_timestamp("2025-11-16 12:00:00").unwrap()
    }

    #[test]
    fn test_records_respect_reference_data() {
        let mut rng = StdRng::seed_from_u64(42);
        for record in generate_records(300, &mut rng, now()) {
            let profile = profile(&record.machine_type).unwrap();
            assert!(record.device_code.starts_with(profile.prefix));
            assert_eq!(record.device_code.len(), 8);
            assert!(profile.models.contains(&record.machine_model.as_str()));
            assert!(profile.suppliers.contains(&record.supplier.as_str()));
            assert_eq!(record.operating_system, profile.operating_system);

            let version: f64 = record.os_version.parse().unwrap();
            assert!(version >= profile.os_version_range.0 - 0.05 && version <= profile.os_version_range.1 + 0.05);

            assert_eq!(record.acquisition_sequence.len(), 13);
            assert!(record.acquisition_sequence.starts_with(&record.branch_id));
            assert!(BRAZILIAN_STATES.contains(&record.state.as_str()));

            let seen = record.last_connection().unwrap();
            assert!(seen <= now() && seen >= now() - Duration::hours(1));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = generate_records(20, &mut StdRng::seed_from_u64(7), now());
        let b = generate_records(20, &mut StdRng::seed_from_u64(7), now());
        assert_eq!(a, b);
    }
}
