//! Sources of assembly bytes.
//!
//! The AppDomain never reads assemblies itself. It hands a name and a [`LoadCompletion`] to its
//! [`ByteSource`] and keeps the requesting thread blocked until the completion has been
//! reported. Completions travel over a channel, so a source may finish synchronously, later on
//! the same thread, or from a worker thread.

use std::{
    cell::Cell,
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
    sync::mpsc::Sender,
    thread,
};

use log::debug;

use crate::file::{Backend, Memory, Physical};

/// A finished load as received by the assembly cache.
#[derive(Debug)]
pub(crate) struct LoadMessage {
    pub(crate) name: String,
    pub(crate) image: Option<Box<dyn Backend>>,
}

/// Handle to report the outcome of one assembly request.
///
/// Dropping the handle without reporting leaves the assembly pending until the load times out.
#[derive(Debug)]
pub struct LoadCompletion {
    name: String,
    sender: Sender<LoadMessage>,
}

impl LoadCompletion {
    pub(crate) fn new(name: &str, sender: Sender<LoadMessage>) -> LoadCompletion {
        LoadCompletion {
            name: name.to_string(),
            sender,
        }
    }

    /// The requested assembly name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver the bytes of the assembly.
    pub fn complete(self, bytes: Vec<u8>) {
        self.send(Some(Box::new(Memory::new(bytes))));
    }

    /// Deliver the assembly as already mapped image storage.
    pub(crate) fn complete_with(self, image: Box<dyn Backend>) {
        self.send(Some(image));
    }

    /// Report that the assembly does not exist.
    pub fn not_found(self) {
        self.send(None);
    }

    fn send(self, image: Option<Box<dyn Backend>>) {
        // The domain may already be gone; nobody is waiting then.
        let _ = self.sender.send(LoadMessage {
            name: self.name,
            image,
        });
    }
}

/// Supplier of raw assembly images.
pub trait ByteSource {
    /// Start loading the assembly `name` and report the outcome through `completion`.
    fn request(&mut self, name: &str, completion: LoadCompletion);
}

/// Assemblies held in memory, keyed by lower-cased name. Completes synchronously.
#[derive(Debug, Default)]
pub struct MemorySource {
    images: HashMap<String, Vec<u8>>,
    fetches: Rc<Cell<usize>>,
}

impl MemorySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Add the image of the assembly `name`.
    #[must_use]
    pub fn with_image(mut self, name: &str, bytes: Vec<u8>) -> MemorySource {
        self.insert(name, bytes);
        self
    }

    /// Add or replace the image of the assembly `name`.
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.images.insert(name.to_lowercase(), bytes);
    }

    /// Shared counter of the requests served so far, including failed ones.
    #[must_use]
    pub fn fetch_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.fetches)
    }
}

impl ByteSource for MemorySource {
    fn request(&mut self, name: &str, completion: LoadCompletion) {
        self.fetches.set(self.fetches.get() + 1);
        match self.images.get(&name.to_lowercase()) {
            Some(bytes) => completion.complete(bytes.clone()),
            None => completion.not_found(),
        }
    }
}

/// Assemblies mapped from a directory on a worker thread.
///
/// `Name` is looked up as `Name.dll`, `Name.exe` and their lower-cased variants.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Serve assemblies from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> DirectorySource {
        DirectorySource { root: root.into() }
    }

    /// The served directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let lower = name.to_lowercase();
        let mut names = vec![format!("{name}.dll"), format!("{name}.exe")];
        if lower != name {
            names.push(format!("{lower}.dll"));
            names.push(format!("{lower}.exe"));
        }
        names.into_iter().map(|file| self.root.join(file)).collect()
    }
}

impl ByteSource for DirectorySource {
    fn request(&mut self, name: &str, completion: LoadCompletion) {
        let candidates = self.candidates(name);
        thread::spawn(move || {
            for path in candidates {
                if let Ok(image) = Physical::new(&path) {
                    debug!("Mapped {} ({} bytes)", path.display(), image.len());
                    completion.complete_with(Box::new(image));
                    return;
                }
            }
            completion.not_found();
        });
    }
}
