//! Assemblies and the per-domain assembly cache.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
    sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    emulation::{
        runtime::{
            source::{LoadCompletion, LoadMessage},
            ByteSource, NativeLibrary,
        },
        MethodCode,
    },
    metadata::{cilimage::CilImage, token::Token},
    Result,
};

/// A loaded assembly: a decoded image, a native library, or both.
///
/// Methods are prepared on first use and cached, so every frame running a method shares one
/// [`MethodCode`] and thereby one operand cache.
pub struct Assembly {
    name: String,
    image: Option<CilImage>,
    library: Option<Box<dyn NativeLibrary>>,
    methods: RefCell<HashMap<Token, Rc<MethodCode>>>,
}

impl Assembly {
    /// An assembly executing the IL of `image`.
    #[must_use]
    pub fn from_image(name: impl Into<String>, image: CilImage) -> Assembly {
        Assembly {
            name: name.into(),
            image: Some(image),
            library: None,
            methods: RefCell::new(HashMap::new()),
        }
    }

    /// An assembly whose methods are provided by `library`.
    #[must_use]
    pub fn native(name: impl Into<String>, library: Box<dyn NativeLibrary>) -> Assembly {
        Assembly {
            name: name.into(),
            image: None,
            library: Some(library),
            methods: RefCell::new(HashMap::new()),
        }
    }

    /// The name the assembly was loaded by.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded image, `None` for native assemblies.
    #[must_use]
    pub fn image(&self) -> Option<&CilImage> {
        self.image.as_ref()
    }

    /// The native library, `None` for IL assemblies.
    #[must_use]
    pub fn library(&self) -> Option<&dyn NativeLibrary> {
        self.library.as_deref()
    }

    /// The prepared code of the `MethodDef` `token`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a native assembly, or any error of
    /// [`MethodCode::prepare`].
    pub fn method(&self, token: Token) -> Result<Rc<MethodCode>> {
        if let Some(code) = self.methods.borrow().get(&token) {
            return Ok(Rc::clone(code));
        }

        let Some(image) = &self.image else {
            return Err(malformed_error!(
                "Assembly {} has no IL for {}",
                self.name,
                token
            ));
        };

        let code = Rc::new(MethodCode::prepare(image, token)?);
        self.methods.borrow_mut().insert(token, Rc::clone(&code));
        Ok(code)
    }

    /// Number of methods prepared so far.
    #[must_use]
    pub fn prepared_methods(&self) -> usize {
        self.methods.borrow().len()
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("name", &self.name)
            .field("il", &self.image.is_some())
            .field("native", &self.library.is_some())
            .field("prepared_methods", &self.prepared_methods())
            .finish()
    }
}

/// Where an assembly name stands in the cache.
#[derive(Clone, Debug)]
pub enum LoadState {
    /// Loaded and ready
    Loaded(Rc<Assembly>),
    /// Requested, waiting for the byte source
    Pending,
    /// The source did not find it or the image failed to load
    Failed,
    /// Never requested
    Unknown,
}

/// Assemblies of a domain by lower-cased name. Each name is fetched from the
/// [`ByteSource`] at most once.
pub struct AssemblyCache {
    loaded: HashMap<String, Rc<Assembly>>,
    pending: HashSet<String>,
    failed: HashSet<String>,
    source: Box<dyn ByteSource>,
    sender: Sender<LoadMessage>,
    receiver: Receiver<LoadMessage>,
    fetches: usize,
}

impl AssemblyCache {
    /// Create an empty cache loading from `source`.
    #[must_use]
    pub fn new(source: Box<dyn ByteSource>) -> AssemblyCache {
        let (sender, receiver) = channel();
        AssemblyCache {
            loaded: HashMap::new(),
            pending: HashSet::new(),
            failed: HashSet::new(),
            source,
            sender,
            receiver,
            fetches: 0,
        }
    }

    /// The state of `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> LoadState {
        let key = name.to_lowercase();
        if let Some(assembly) = self.loaded.get(&key) {
            LoadState::Loaded(Rc::clone(assembly))
        } else if self.pending.contains(&key) {
            LoadState::Pending
        } else if self.failed.contains(&key) {
            LoadState::Failed
        } else {
            LoadState::Unknown
        }
    }

    /// The state of `name`, asking the byte source for it if it was never requested.
    pub fn request(&mut self, name: &str) -> LoadState {
        let state = self.lookup(name);
        if !matches!(state, LoadState::Unknown) {
            return state;
        }

        debug!("Requesting assembly {}", name);
        self.pending.insert(name.to_lowercase());
        self.fetches += 1;
        self.source
            .request(name, LoadCompletion::new(name, self.sender.clone()));
        LoadState::Pending
    }

    /// Add an assembly under its own name, replacing an earlier one.
    pub fn insert(&mut self, assembly: Rc<Assembly>) {
        let key = assembly.name().to_lowercase();
        self.pending.remove(&key);
        self.failed.remove(&key);
        self.loaded.insert(key, assembly);
    }

    /// Process every completion that arrived so far, returning the names that finished.
    pub fn drain(&mut self) -> Vec<String> {
        let mut finished = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            finished.push(self.finish(message));
        }
        finished
    }

    /// Block until the next completion arrives or `timeout` passes.
    ///
    /// Returns the finished name, `None` on timeout.
    pub fn wait(&mut self, timeout: Duration) -> Option<String> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(self.finish(message)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn finish(&mut self, message: LoadMessage) -> String {
        let key = message.name.to_lowercase();
        self.pending.remove(&key);

        let image = match message.image {
            Some(data) => CilImage::from_backend(data),
            None => Err(crate::Error::Error(format!(
                "assembly {} not found",
                message.name
            ))),
        };

        match image {
            Ok(image) => {
                debug!("Loaded assembly {}", message.name);
                self.loaded.insert(
                    key,
                    Rc::new(Assembly::from_image(message.name.clone(), image)),
                );
            }
            Err(error) => {
                warn!("Failed to load assembly {}: {}", message.name, error);
                self.failed.insert(key);
            }
        }

        message.name
    }

    /// Names still waiting for their byte source.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// All loaded assemblies.
    pub fn loaded(&self) -> impl Iterator<Item = &Rc<Assembly>> {
        self.loaded.values()
    }

    /// Number of requests handed to the byte source.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

impl fmt::Debug for AssemblyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyCache")
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .field("failed", &self.failed)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::runtime::{ConsoleLibrary, MemorySource},
        test::{tiny_body, ImageBuilder},
    };

    fn library_image() -> Vec<u8> {
        let mut builder = ImageBuilder::new("Lib");
        builder.type_def("Lib", "Util");
        builder.method("Nothing", &[0x00, 0x00, 0x01], &tiny_body(&[0x2A]));
        builder.build()
    }

    #[test]
    fn test_method_cache() {
        let image = CilImage::from_mem(library_image()).unwrap();
        let assembly = Assembly::from_image("Lib", image);
        let token = Token::new(0x0600_0001);

        let first = assembly.method(token).unwrap();
        let second = assembly.method(token).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.name, "Nothing");
        assert_eq!(assembly.prepared_methods(), 1);
        assert!(assembly.method(Token::new(0x0600_0009)).is_err());

        let native = Assembly::native("mscorlib", Box::new(ConsoleLibrary::default()));
        assert!(native.method(token).is_err());
        assert!(native.library().is_some());
    }

    #[test]
    fn test_fetch_once() {
        let source = MemorySource::new()
            .with_image("Lib", library_image())
            .with_image("Broken", vec![0x4D, 0x5A, 0x00]);
        let counter = source.fetch_counter();
        let mut cache = AssemblyCache::new(Box::new(source));

        assert!(matches!(cache.lookup("lib"), LoadState::Unknown));
        assert!(matches!(cache.request("Lib"), LoadState::Pending));
        assert!(matches!(cache.request("LIB"), LoadState::Pending));
        assert_eq!(cache.drain(), vec!["Lib".to_string()]);
        assert!(matches!(cache.request("lib"), LoadState::Loaded(_)));

        cache.request("Broken");
        cache.request("Missing");
        assert_eq!(cache.drain().len(), 2);
        assert!(matches!(cache.lookup("broken"), LoadState::Failed));
        assert!(matches!(cache.request("missing"), LoadState::Failed));

        assert_eq!(cache.fetches(), 3);
        assert_eq!(counter.get(), 3);
        assert_eq!(cache.pending().count(), 0);
        assert!(cache.wait(Duration::from_millis(1)).is_none());
    }
}
