/*!
# Segwatch DevKit - Données synthétiques et utilitaires de test

Bibliothèque facilitant le développement et les tests de segwatch avec:
- Générateur de parc de machines synthétique (binaire `segwatch-fleetgen`)
- Harness de test sur dossier temporaire (inventaire, store, alertes)
*/

pub mod fleet_gen;
pub mod test_utils;

pub use fleet_gen::{build_record, generate_records};
pub use test_utils::TestHarness;
