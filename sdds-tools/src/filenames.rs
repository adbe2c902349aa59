use std::fs;
use std::path::{Path, PathBuf};

use sdds_error::{SddsError, SddsResult, sdds_bail, sdds_err};
use sdds_file::Location;

use crate::scan::PipeFlags;

/// Where a filter utility reads and writes.
///
/// When no output is named, or it names the input, output goes to a temporary file beside the
/// input. [`Filenames::finish`] then moves the input to `name~` and the temporary file into its
/// place.
#[derive(Debug)]
pub struct Filenames {
    pub input: Location,
    pub output: Location,
    replace: Option<PathBuf>,
}

/// Resolve the positional file names of a filter utility.
pub fn process_filenames(positionals: &[String], pipe: PipeFlags) -> SddsResult<Filenames> {
    let (mut input, mut output) = match positionals {
        [] => (None, None),
        [one] => (Some(PathBuf::from(one)), None),
        [one, two] => (Some(PathBuf::from(one)), Some(PathBuf::from(two))),
        _ => sdds_bail!("too many file names: {}", positionals.join(" ")),
    };
    if pipe.input {
        if output.is_some() {
            sdds_bail!("too many file names for -pipe=input");
        }
        output = input.take();
    }
    if pipe.output && output.is_some() {
        sdds_bail!("too many file names for -pipe=output");
    }

    let mut replace = None;
    if !pipe.input && input.is_none() {
        sdds_bail!("no input file given");
    }
    if !pipe.output {
        match (&input, &output) {
            (Some(from), None) => {
                replace = Some(from.clone());
                output = Some(temporary_beside(from)?);
            }
            (Some(from), Some(to)) if same_file(from, to) => {
                replace = Some(from.clone());
                output = Some(temporary_beside(from)?);
            }
            (None, None) => sdds_bail!("no output file given"),
            _ => {}
        }
    }
    Ok(Filenames {
        input: input.into(),
        output: output.into(),
        replace,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn temporary_beside(path: &Path) -> SddsResult<PathBuf> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file = tempfile::Builder::new()
        .prefix(".sdds")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let (_, path) = file
        .keep()
        .map_err(|e| sdds_err!("cannot create a temporary file in {}: {}", dir.display(), e))?;
    Ok(path)
}

impl Filenames {
    /// Whether the output replaces the input when finished.
    pub fn replaces_input(&self) -> bool {
        self.replace.is_some()
    }

    /// Move the finished output into place.
    pub fn finish(self) -> SddsResult<()> {
        let (Some(original), Location::Path(temporary)) = (self.replace, self.output) else {
            return Ok(());
        };
        let mut backup = original.clone().into_os_string();
        backup.push("~");
        let context = |what: &str| format!("{} {}", what, original.display());
        fs::rename(&original, &backup)
            .map_err(|e| SddsError::from(e).with_context(context("backing up")))?;
        fs::rename(&temporary, &original)
            .map_err(|e| SddsError::from(e).with_context(context("replacing")))?;
        log::debug!("replaced {} keeping a backup", original.display());
        Ok(())
    }

    /// Remove the temporary output after a failure.
    pub fn abandon(self) {
        if let (Some(_), Location::Path(temporary)) = (self.replace, self.output) {
            // Nothing more can be done if removal fails.
            let _ = fs::remove_file(temporary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_names() {
        let f = process_filenames(&names(&["a.sdds", "b.sdds"]), PipeFlags::default()).unwrap();
        assert_eq!(f.input, Location::Path("a.sdds".into()));
        assert_eq!(f.output, Location::Path("b.sdds".into()));
        assert!(!f.replaces_input());
    }

    #[test]
    fn pipes() {
        let both = PipeFlags {
            input: true,
            output: true,
        };
        let f = process_filenames(&[], both).unwrap();
        assert_eq!((f.input, f.output), (Location::Pipe, Location::Pipe));

        let input = PipeFlags {
            input: true,
            output: false,
        };
        let f = process_filenames(&names(&["out.sdds"]), input).unwrap();
        assert_eq!(f.input, Location::Pipe);
        assert_eq!(f.output, Location::Path("out.sdds".into()));

        assert!(process_filenames(&names(&["a", "b"]), input).is_err());
        assert!(process_filenames(&names(&["a", "b"]), both).is_err());
    }

    #[test]
    fn missing_names() {
        assert!(process_filenames(&[], PipeFlags::default()).is_err());
        assert!(process_filenames(&names(&["a", "b", "c"]), PipeFlags::default()).is_err());
    }

    #[test]
    fn single_name_replaces_input_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("data.sdds");
        fs::write(&original, "old").unwrap();
        let positionals = vec![original.display().to_string()];
        let f = process_filenames(&positionals, PipeFlags::default()).unwrap();
        assert!(f.replaces_input());
        let Location::Path(temporary) = &f.output else {
            panic!("expected a temporary output file");
        };
        assert_eq!(temporary.parent(), Some(dir.path()));
        fs::write(temporary, "new").unwrap();
        f.finish().unwrap();
        assert_eq!(fs::read_to_string(&original).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(dir.path().join("data.sdds~")).unwrap(),
            "old"
        );
    }
}
