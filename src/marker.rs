//! Advisory "database was started at least once" state.
//!
//! The marker says nothing about whether a data volume exists right now; it
//! only drives warnings.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".docker";
pub const MYSQL_MARKER: &str = "mysql_initialized";

pub trait MarkerStore {
    fn is_initialized(&self, project: &Path) -> bool;
    fn mark_initialized(&self, project: &Path) -> io::Result<()>;
}

/// Zero-byte sentinel at `<project>/.docker/mysql_initialized`. Never removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMarkerStore;

impl FileMarkerStore {
    pub fn marker_path(project: &Path) -> PathBuf {
        project.join(STATE_DIR).join(MYSQL_MARKER)
    }
}

impl MarkerStore for FileMarkerStore {
    fn is_initialized(&self, project: &Path) -> bool {
        Self::marker_path(project).exists()
    }

    fn mark_initialized(&self, project: &Path) -> io::Result<()> {
        let marker = Self::marker_path(project);
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
            .map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    initialized: RefCell<BTreeSet<PathBuf>>,
}

impl MarkerStore for MemoryMarkerStore {
    fn is_initialized(&self, project: &Path) -> bool {
        self.initialized.borrow().contains(project)
    }

    fn mark_initialized(&self, project: &Path) -> io::Result<()> {
        self.initialized.borrow_mut().insert(project.to_path_buf());
        Ok(())
    }
}
