/**
 * SEGWATCH KERNEL - Cœur de l'observation d'un parc de machines simulé
 *
 * RÔLE : Inventaire + heartbeats, agrégation par segment, store de séries,
 * moniteur de chute du % en ligne, et transport HTTP au-dessus.
 *
 * FLUX : inventaire → agrégation → payload JSON → store → moniteur → alerte.
 * Le cœur ne lit jamais l'horloge : `now` est injecté par le transport ou la CLI.
 */

pub mod alert_log;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod inventory;
pub mod monitor;
pub mod persist;
pub mod segments;
pub mod state;
pub mod store;

pub use error::{Result, SegwatchError};
