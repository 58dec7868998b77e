//! Écritures atomiques : fichier temporaire dans le même dossier puis rename.
//! Un crash en cours d'écriture laisse la version précédente intacte.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, SegwatchError};

/// Crée le dossier parent si besoin (no-op pour un chemin relatif nu)
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| SegwatchError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Écrit `path` en tout-ou-rien via `write`.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
{
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = temp_file_for(path, dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        write(&mut out).map_err(|e| SegwatchError::io(path, e))?;
        out.flush().map_err(|e| SegwatchError::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| SegwatchError::io(path, e))?;
    tmp.persist(path).map_err(|e| SegwatchError::io(path, e.error))?;
    Ok(())
}

/// Fichier temporaire portant les droits de la cible (ou ceux d'un
/// `File::create` classique si elle n'existe pas encore).
fn temp_file_for(target: &Path, dir: &Path) -> Result<NamedTempFile> {
    let existing = fs::metadata(target).ok().map(|meta| meta.permissions());

    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // 0666 filtré par l'umask à la création
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let tmp = builder.tempfile_in(dir).map_err(|e| SegwatchError::io(dir, e))?;

    // set_permissions ignore l'umask : droits de la cible à l'identique
    if let Some(permissions) = existing {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| SegwatchError::io(target, e))?;
    }
    Ok(tmp)
}
