//! On-disk workspace.
//!
//! A workspace is a directory holding one derivation session:
//!
//! - `grade_first_cut.csv`: the table as derived, never edited
//! - `grade_edited.csv`: the working table (absent until the first edit)
//! - `edit_log.csv`: edit history, oldest first
//! - `pay_range_final.csv`: the aged table
//!
//! Every file is written to a temporary sibling and renamed into place. An edit
//! stages both the working table and the log before renaming either, so a
//! failed write never leaves a log that disagrees with its table.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bands::{BandEditor, EditLog};
use crate::domain::{BandTable, EditRecord};
use crate::error::AppError;
use crate::io::table::{TableLayout, read_table_file, write_table_file};

pub const FIRST_CUT_FILE: &str = "grade_first_cut.csv";
pub const WORKING_FILE: &str = "grade_edited.csv";
pub const EDIT_LOG_FILE: &str = "edit_log.csv";
pub const FINAL_FILE: &str = "pay_range_final.csv";

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Open (and create if needed) a workspace directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::input(format!("Failed to create workspace '{}': {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn has_first_cut(&self) -> bool {
        self.path(FIRST_CUT_FILE).is_file()
    }

    /// Store a fresh derivation. Any previous edits and aged table are discarded.
    pub fn save_first_cut(&self, table: &BandTable) -> Result<(), AppError> {
        let staged = stage_table(&self.path(FIRST_CUT_FILE), table)?;
        commit(&[staged])?;
        for stale in [WORKING_FILE, EDIT_LOG_FILE, FINAL_FILE] {
            remove_if_exists(&self.path(stale))?;
        }
        debug!(dir = %self.dir.display(), grades = table.len(), "saved first cut");
        Ok(())
    }

    pub fn load_first_cut(&self) -> Result<BandTable, AppError> {
        if !self.has_first_cut() {
            return Err(AppError::input(format!(
                "No derived table in '{}'. Run `payband derive` first.",
                self.dir.display()
            )));
        }
        read_table_file(&self.path(FIRST_CUT_FILE))
    }

    /// The working table, falling back to the first cut when nothing was edited.
    pub fn load_working(&self) -> Result<BandTable, AppError> {
        let edited = self.path(WORKING_FILE);
        if edited.is_file() {
            read_table_file(&edited)
        } else {
            self.load_first_cut()
        }
    }

    pub fn load_log(&self) -> Result<EditLog, AppError> {
        let path = self.path(EDIT_LOG_FILE);
        if !path.is_file() {
            return Ok(EditLog::default());
        }
        let file = File::open(&path)
            .map_err(|e| AppError::input(format!("Failed to open edit log '{}': {e}", path.display())))?;
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let entries = rdr
            .deserialize::<EditRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::input(format!("Invalid edit log '{}': {e}", path.display())))?;
        Ok(EditLog::from_entries(entries))
    }

    pub fn load_editor(&self) -> Result<BandEditor, AppError> {
        let first_cut = self.load_first_cut()?;
        let working = self.load_working()?;
        let log = self.load_log()?;
        Ok(BandEditor::from_parts(first_cut, working, log))
    }

    /// Persist the working table together with its edit log.
    pub fn save_editor(&self, editor: &BandEditor) -> Result<(), AppError> {
        let table = stage_table(&self.path(WORKING_FILE), editor.table())?;
        let log = stage_log(&self.path(EDIT_LOG_FILE), editor.log())?;
        commit(&[table, log])?;
        debug!(dir = %self.dir.display(), log_len = editor.log().len(), "saved working table");
        Ok(())
    }

    pub fn write_final(&self, table: &BandTable) -> Result<PathBuf, AppError> {
        let path = self.path(FINAL_FILE);
        let staged = stage_table(&path, table)?;
        commit(&[staged])?;
        Ok(path)
    }

    pub fn load_final(&self) -> Result<BandTable, AppError> {
        read_table_file(&self.path(FINAL_FILE))
    }
}

/// A file written next to its destination, waiting to be renamed into place.
struct Staged {
    tmp: PathBuf,
    dest: PathBuf,
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

fn stage_table(dest: &Path, table: &BandTable) -> Result<Staged, AppError> {
    let tmp = tmp_path(dest);
    write_table_file(&tmp, table, TableLayout::State)?;
    Ok(Staged {
        tmp,
        dest: dest.to_path_buf(),
    })
}

fn stage_log(dest: &Path, log: &EditLog) -> Result<Staged, AppError> {
    let tmp = tmp_path(dest);
    let file = File::create(&tmp)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", tmp.display())))?;
    let mut wtr = csv::Writer::from_writer(file);
    if log.is_empty() {
        // Keep the header so the file stays self-describing.
        wtr.write_record(["Grade", "Parameter", "Current Value", "New Value", "Timestamp"])
            .map_err(|e| AppError::input(format!("Failed to write edit log header: {e}")))?;
    }
    for entry in log.iter() {
        wtr.serialize(entry)
            .map_err(|e| AppError::input(format!("Failed to write edit log row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush edit log: {e}")))?;
    Ok(Staged {
        tmp,
        dest: dest.to_path_buf(),
    })
}

fn commit(staged: &[Staged]) -> Result<(), AppError> {
    for s in staged {
        fs::rename(&s.tmp, &s.dest).map_err(|e| {
            AppError::input(format!("Failed to move '{}' into place: {e}", s.dest.display()))
        })?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), AppError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::input(format!("Failed to remove '{}': {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::derive_bands;
    use crate::domain::{BandParam, BandWidth, GradeMid, MidSource};

    fn first_cut() -> BandTable {
        let mids: Vec<GradeMid> = [30_000.0, 34_500.5, 40_100.25, 47_000.0]
            .iter()
            .enumerate()
            .map(|(i, &mid)| GradeMid {
                grade: i as i64 + 1,
                mid,
                source: MidSource::Calculated,
            })
            .collect();
        derive_bands(&mids, &BandWidth::default()).unwrap()
    }

    #[test]
    fn editor_survives_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.save_first_cut(&first_cut()).unwrap();

        let mut editor = ws.load_editor().unwrap();
        assert!(editor.log().is_empty());
        editor.apply(2, BandParam::Mid, 35_123.456).unwrap();
        editor.apply(3, BandParam::SpreadPct, 62.5).unwrap();
        ws.save_editor(&editor).unwrap();

        let reloaded = ws.load_editor().unwrap();
        assert_eq!(reloaded.table(), editor.table());
        assert_eq!(reloaded.first_cut(), editor.first_cut());
        assert_eq!(reloaded.log(), editor.log());
        assert!(!ws.path("grade_edited.csv.tmp").exists());
    }

    #[test]
    fn undo_after_reload_restores_first_cut() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.save_first_cut(&first_cut()).unwrap();

        let mut editor = ws.load_editor().unwrap();
        editor.apply(4, BandParam::Mid, 49_999.99).unwrap();
        ws.save_editor(&editor).unwrap();

        let mut editor = ws.load_editor().unwrap();
        editor.undo_last().unwrap();
        ws.save_editor(&editor).unwrap();

        assert_eq!(ws.load_working().unwrap(), first_cut());
        assert!(ws.load_log().unwrap().is_empty());
    }

    #[test]
    fn new_derivation_discards_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.save_first_cut(&first_cut()).unwrap();
        let mut editor = ws.load_editor().unwrap();
        editor.apply(1, BandParam::Mid, 31_000.0).unwrap();
        ws.save_editor(&editor).unwrap();

        ws.save_first_cut(&first_cut()).unwrap();
        assert!(!ws.path(WORKING_FILE).exists());
        assert!(ws.load_log().unwrap().is_empty());
    }

    #[test]
    fn missing_first_cut_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let err = ws.load_editor().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("payband derive"));
    }
}
