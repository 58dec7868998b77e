/**
 * ERREURS SEGWATCH - Taxonomie unique des échecs du cœur
 *
 * RÔLE :
 * Toutes les opérations du cœur (inventaire, agrégation, store, moniteur)
 * retournent `Result<T, SegwatchError>`. Le transport HTTP et les CLI
 * décident ensuite du code de retour à partir de la catégorie.
 *
 * CATÉGORIES :
 * - Validation d'entrée : timestamp invalide (HTTP 400), paramètre hors bornes (HTTP 422)
 * - Données manquantes : inventaire absent ou vide, fichier CSV absent
 * - Stockage : IO, CSV, SQLite
 *
 * Les lignes d'inventaire au timestamp illisible ne sont PAS des erreurs :
 * elles sont simplement exclues du filtre "récent".
 */

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SegwatchError {
    #[error("Invalid timestamp for `{field}`: {value:?}. Use \"YYYY-MM-DD HH:MM:SS\".")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("`{field}` = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("{what} not found at {}", path.display())]
    MissingData { what: &'static str, path: PathBuf },

    #[error("No device records found in {}", path.display())]
    EmptyInventory { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl SegwatchError {
    /// Erreur imputable à l'appelant (requête rejetée sans effet de bord)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidTimestamp { .. } | Self::OutOfRange { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SegwatchError>;
