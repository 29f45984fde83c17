//! The AppDomain: heap, reference table, assemblies and threads of one program.

use std::{collections::HashMap, fmt, path::Path, rc::Rc};

use log::{debug, trace};

use crate::{
    config::RuntimeConfig,
    emulation::{
        collect,
        runtime::{Assembly, AssemblyCache, ByteSource, ConsoleLibrary, LoadState, NativeLibrary},
        thread::{CallFrame, Scheduler, Thread, ThreadId, TickReport},
        CollectionStats, EmValue, EmulationError, Heap, Interpreter, Reference, ReferenceTable,
    },
    metadata::{cilimage::CilImage, tables::TableId},
    Result,
};

/// Name of the built-in native assembly.
pub const CORLIB: &str = "mscorlib";

/// Everything a thread step may touch besides its own stack and frames.
pub struct DomainContext {
    /// Cells of initialized primitive locals
    pub heap: Heap,
    /// Arrays and other heap objects
    pub references: ReferenceTable,
    /// Loaded and loading assemblies
    pub assemblies: AssemblyCache,
    /// The instruction interpreter
    pub interpreter: Interpreter,
    /// The configuration the domain was created with
    pub config: RuntimeConfig,
}

impl DomainContext {
    /// Create the shared state of a domain, with the console-backed `mscorlib` registered.
    ///
    /// # Errors
    /// Returns an allocator error if the initial heap cannot be created.
    pub fn new(config: RuntimeConfig, source: Box<dyn ByteSource>) -> Result<DomainContext> {
        let mut assemblies = AssemblyCache::new(source);
        assemblies.insert(Rc::new(Assembly::native(
            CORLIB,
            Box::new(ConsoleLibrary::default()),
        )));

        Ok(DomainContext {
            heap: Heap::new(config.initial_heap_size)?,
            references: ReferenceTable::new().with_max_array_length(config.max_array_length),
            assemblies,
            interpreter: Interpreter::new(config.specialize_opcodes),
            config,
        })
    }
}

impl fmt::Debug for DomainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainContext")
            .field("heap", &self.heap.len())
            .field("references", &self.references.len())
            .field("assemblies", &self.assemblies)
            .field("interpreter", &self.interpreter)
            .finish_non_exhaustive()
    }
}

/// An isolated program: its memory, its assemblies and its green threads.
///
/// The host drives the domain by calling [`AppDomain::tick`], or [`AppDomain::run_to_completion`]
/// to pump until every thread finished.
///
/// ```rust,no_run
/// use dotrun::{
///     config::RuntimeConfig,
///     emulation::runtime::{AppDomain, DirectorySource},
/// };
///
/// let mut domain = AppDomain::new(RuntimeConfig::default(), Box::new(DirectorySource::new(".")))?;
/// let assembly = domain.load_file("Fib.exe".as_ref())?;
/// let thread = domain.run(&assembly)?;
/// domain.run_to_completion()?;
/// println!("{:?}", domain.exit_value(thread));
/// # Ok::<(), dotrun::Error>(())
/// ```
pub struct AppDomain {
    context: DomainContext,
    threads: Vec<Thread>,
    scheduler: Scheduler,
    next_thread: u32,
    ticks: u64,
    finalization_queue: Vec<Reference>,
    pending_starts: Vec<String>,
    exits: HashMap<ThreadId, Option<EmValue>>,
}

impl AppDomain {
    /// Create a domain loading assemblies from `source`.
    ///
    /// # Errors
    /// Returns an allocator error if the initial heap cannot be created.
    pub fn new(config: RuntimeConfig, source: Box<dyn ByteSource>) -> Result<AppDomain> {
        let scheduler = Scheduler::new(config.step_budget);
        Ok(AppDomain {
            context: DomainContext::new(config, source)?,
            threads: Vec::new(),
            scheduler,
            next_thread: 0,
            ticks: 0,
            finalization_queue: Vec::new(),
            pending_starts: Vec::new(),
            exits: HashMap::new(),
        })
    }

    /// Register a native assembly, replacing one of the same name.
    pub fn register_native(&mut self, name: &str, library: Box<dyn NativeLibrary>) -> Rc<Assembly> {
        let assembly = Rc::new(Assembly::native(name, library));
        self.context.assemblies.insert(Rc::clone(&assembly));
        assembly
    }

    /// Add an already decoded image under `name`.
    pub fn add_assembly(&mut self, name: &str, image: CilImage) -> Rc<Assembly> {
        let assembly = Rc::new(Assembly::from_image(name, image));
        self.context.assemblies.insert(Rc::clone(&assembly));
        assembly
    }

    /// Load an image from disk, naming it after its `Assembly` row or else the file stem.
    ///
    /// # Errors
    /// Returns any loader error of [`CilImage::from_file`].
    pub fn load_file(&mut self, path: &Path) -> Result<Rc<Assembly>> {
        let image = CilImage::from_file(path)?;
        let name = match image.assembly_name() {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        debug!("Loaded {} from {}", name, path.display());
        Ok(self.add_assembly(&name, image))
    }

    /// Start a thread running the entry point of `assembly`.
    ///
    /// The thread's operand stack holds an empty argument array for the entry point.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidEntryPoint`] unless the entry point token names an
    /// existing `MethodDef`, or [`EmulationError::ReferenceTableFull`] if the argument array
    /// cannot be allocated.
    pub fn run(&mut self, assembly: &Rc<Assembly>) -> Result<ThreadId> {
        let token = assembly
            .image()
            .map(CilImage::entry_point)
            .unwrap_or_default();
        let valid = assembly.image().is_some_and(|image| {
            token.table() == TableId::MethodDef as u8
                && image.tables().method_def.get(token.row()).is_some()
        });
        if !valid {
            return Err(EmulationError::InvalidEntryPoint { token }.into());
        }

        let arguments = self.context.references.alloc_array(0, EmValue::Null)?;
        let id = ThreadId(self.next_thread);
        self.next_thread += 1;

        let mut thread = Thread::new(id);
        thread.stack_mut().push(EmValue::Object(arguments));
        thread.push_frame(CallFrame::new(token, Rc::clone(assembly)));
        self.threads.push(thread);

        debug!("Thread {} runs {} of {}", id, token, assembly.name());
        Ok(id)
    }

    /// Load the assembly `name` from the byte source and run its entry point once it arrived.
    pub fn start(&mut self, name: &str) {
        self.context.assemblies.request(name);
        self.pending_starts.push(name.to_string());
    }

    /// One round of the domain: finish loads, start waiting assemblies, serve the threads,
    /// collect and defragment.
    ///
    /// # Errors
    /// Any error aborts the domain.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.ticks += 1;
        self.context.assemblies.drain();
        self.start_pending()?;

        let report = self.scheduler.tick(&mut self.threads, &mut self.context)?;
        for thread in &report.finished {
            self.exits.insert(thread.id(), thread.result().cloned());
        }

        let interval = self.context.config.gc_interval;
        if interval > 0 && self.ticks % interval == 0 {
            self.collect_garbage()?;
        }
        self.context.heap.defragment()?;

        trace!(
            "Tick {}: served {:?}, {} steps, {} threads left",
            self.ticks,
            report.served,
            report.steps,
            self.threads.len()
        );
        Ok(report)
    }

    fn start_pending(&mut self) -> Result<()> {
        for name in std::mem::take(&mut self.pending_starts) {
            match self.context.assemblies.request(&name) {
                LoadState::Loaded(assembly) => {
                    self.run(&assembly)?;
                }
                LoadState::Failed => {
                    return Err(EmulationError::AssemblyNotFound { name }.into());
                }
                LoadState::Pending | LoadState::Unknown => self.pending_starts.push(name),
            }
        }

        Ok(())
    }

    /// Tick until no thread is left, waiting on the byte source while every thread is blocked.
    ///
    /// # Errors
    /// Returns [`EmulationError::LoadTimeout`] when a load does not complete within the
    /// configured timeout, or the first error of [`AppDomain::tick`].
    pub fn run_to_completion(&mut self) -> Result<()> {
        while !self.is_idle() {
            let report = self.tick()?;
            if report.progressed() {
                continue;
            }

            let Some(name) = self.context.assemblies.pending().next().map(str::to_string) else {
                continue;
            };
            if self
                .context
                .assemblies
                .wait(self.context.config.load_timeout)
                .is_none()
            {
                return Err(EmulationError::LoadTimeout { name }.into());
            }
        }

        Ok(())
    }

    /// Returns true if no thread is alive and no start is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.threads.is_empty() && self.pending_starts.is_empty()
    }

    /// Collect every heap object unreachable from the threads.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] if a root is stale.
    pub fn collect_garbage(&mut self) -> Result<CollectionStats> {
        let roots = self.threads.iter().flat_map(Thread::roots);
        let stats = collect(
            &mut self.context.references,
            roots,
            &mut self.finalization_queue,
        )?;

        trace!(
            "Collected: {} marked, {} swept, {} finalizable",
            stats.marked,
            stats.swept,
            stats.finalizable
        );
        Ok(stats)
    }

    /// Take the finalizable objects condemned so far.
    pub fn take_finalization_queue(&mut self) -> Vec<Reference> {
        std::mem::take(&mut self.finalization_queue)
    }

    /// The value returned by the entry point of a finished thread.
    #[must_use]
    pub fn exit_value(&self, thread: ThreadId) -> Option<&EmValue> {
        self.exits.get(&thread).and_then(Option::as_ref)
    }

    /// Returns true if the thread ran to completion.
    #[must_use]
    pub fn has_exited(&self, thread: ThreadId) -> bool {
        self.exits.contains_key(&thread)
    }

    /// Live threads.
    #[must_use]
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Ticks so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The shared state of the domain.
    #[must_use]
    pub fn context(&self) -> &DomainContext {
        &self.context
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.context.heap
    }

    /// The heap objects.
    #[must_use]
    pub fn references(&self) -> &ReferenceTable {
        &self.context.references
    }

    /// Mutable access to the heap objects.
    pub fn references_mut(&mut self) -> &mut ReferenceTable {
        &mut self.context.references
    }

    /// The assembly cache.
    #[must_use]
    pub fn assemblies(&self) -> &AssemblyCache {
        &self.context.assemblies
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.context.config
    }
}

impl fmt::Debug for AppDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDomain")
            .field("context", &self.context)
            .field("threads", &self.threads.len())
            .field("scheduler", &self.scheduler)
            .field("ticks", &self.ticks)
            .field("pending_starts", &self.pending_starts)
            .finish_non_exhaustive()
    }
}
