//! Threads of an AppDomain and their scheduling.
//!
//! A [`Thread`] owns an operand stack shared by all of its frames and a call stack of
//! [`CallFrame`]s. Each [`Thread::step`] advances the top frame by one state transition or one
//! IL instruction. The [`Scheduler`] serves the live threads of a domain round-robin.

mod frame;
mod scheduler;

pub use frame::{CallFrame, CellType, FrameState, LocalSlot};
pub use scheduler::{Scheduler, StepBudget, TickReport};

use std::{fmt, rc::Rc};

use log::debug;

use crate::{
    emulation::{
        runtime::{native_key, Assembly, DomainContext, LoadState, NativeCall, NativeOutcome},
        EmValue, EmulationError, EvaluationStack, StepResult,
    },
    metadata::{signatures::parse_method_signature, tables::TableId},
    Result,
};

/// Identifier of a thread, unique within its domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a thread cannot run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting for the named assembly to load
    AssemblyLoad(String),
}

/// Outcome of a single [`Thread::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// The thread made progress and can continue
    Continue,
    /// The thread cannot continue until the reason is resolved
    Blocked(BlockReason),
    /// The last frame returned
    Finished,
}

/// A green thread of an AppDomain.
#[derive(Debug)]
pub struct Thread {
    id: ThreadId,
    stack: EvaluationStack,
    frames: Vec<CallFrame>,
    steps: u64,
    result: Option<EmValue>,
}

impl Thread {
    /// A thread without frames.
    #[must_use]
    pub fn new(id: ThreadId) -> Thread {
        Thread {
            id,
            stack: EvaluationStack::new(),
            frames: Vec::new(),
            steps: 0,
            result: None,
        }
    }

    /// The thread id.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The shared operand stack.
    #[must_use]
    pub fn stack(&self) -> &EvaluationStack {
        &self.stack
    }

    /// Mutable access to the operand stack, used to pass arguments to the first frame.
    pub fn stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.stack
    }

    /// The call stack, innermost frame last.
    #[must_use]
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Push a frame on top of the call stack.
    pub fn push_frame(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns true once the last frame was popped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.frames.is_empty()
    }

    /// The value returned by the outermost method, if it returns one.
    #[must_use]
    pub fn result(&self) -> Option<&EmValue> {
        self.result.as_ref()
    }

    /// Values the collector treats as roots: the operand stack and every frame's roots.
    pub fn roots(&self) -> impl Iterator<Item = &EmValue> {
        self.stack
            .iter()
            .chain(self.frames.iter().flat_map(CallFrame::roots))
    }

    /// Advance the top frame by one state transition or one instruction.
    ///
    /// # Errors
    /// Any error is fatal for the thread. A pending assembly load is reported as
    /// [`ThreadStatus::Blocked`], not as an error.
    pub fn step(&mut self, ctx: &mut DomainContext) -> Result<ThreadStatus> {
        let depth = self.frames.len();
        let Some(frame) = self.frames.last_mut() else {
            return Ok(ThreadStatus::Finished);
        };
        self.steps += 1;

        match frame.state.clone() {
            FrameState::ResolveToken => resolve_token(frame, ctx),
            FrameState::WaitForAssembly(name) => wait_for_assembly(frame, ctx, name),
            FrameState::BindNative => bind(frame, &mut self.stack),
            FrameState::SetupLocals => setup_locals(frame, &mut self.stack, ctx),
            FrameState::Executing => {
                if let Some(native) = frame.native.clone() {
                    let mut call = NativeCall {
                        arguments: &frame.arguments,
                        heap: &mut ctx.heap,
                        references: &mut ctx.references,
                    };
                    if let NativeOutcome::Complete(value) = (*native)(&mut call)? {
                        if let Some(value) = value {
                            self.stack.push(value);
                        }
                        transition(frame, FrameState::Unwind);
                    }
                    return Ok(ThreadStatus::Continue);
                }

                match ctx.interpreter.step(
                    frame,
                    &mut self.stack,
                    &mut ctx.heap,
                    &mut ctx.references,
                )? {
                    StepResult::Continue => {}
                    StepResult::Return => transition(frame, FrameState::Unwind),
                    StepResult::Call(token) => {
                        let limit = ctx.config.max_call_depth;
                        if depth >= limit {
                            return Err(EmulationError::CallDepthExceeded { limit }.into());
                        }

                        let calling = executing(frame)?;
                        self.frames.push(CallFrame::new(token, calling));
                    }
                }
                Ok(ThreadStatus::Continue)
            }
            FrameState::Unwind => {
                frame.release(&mut ctx.heap)?;
                let returns = frame
                    .code
                    .as_ref()
                    .is_some_and(|code| code.signature.returns_value());
                debug!(
                    "Thread {} left {}",
                    self.id,
                    frame.method_name().unwrap_or("<unresolved>")
                );
                self.frames.pop();

                if self.frames.is_empty() {
                    if returns {
                        self.result = self.stack.peek(0).ok().cloned();
                    }
                    return Ok(ThreadStatus::Finished);
                }
                Ok(ThreadStatus::Continue)
            }
        }
    }
}

fn transition(frame: &mut CallFrame, state: FrameState) {
    debug!("{} {} -> {}", frame.token, frame.state, state);
    frame.state = state;
}

fn executing(frame: &CallFrame) -> Result<Rc<Assembly>> {
    frame
        .executing
        .clone()
        .ok_or_else(|| malformed_error!("Frame has no executing assembly - {}", frame.token))
}

fn resolve_token(frame: &mut CallFrame, ctx: &mut DomainContext) -> Result<ThreadStatus> {
    let token = frame.token;
    if token.table() == TableId::MethodDef as u8 {
        frame.executing = Some(Rc::clone(&frame.calling));
        transition(frame, FrameState::SetupLocals);
        return Ok(ThreadStatus::Continue);
    }

    if token.table() != TableId::MemberRef as u8 {
        return Err(EmulationError::UnsupportedToken { token }.into());
    }

    let image = frame
        .calling
        .image()
        .ok_or_else(|| malformed_error!("Calling assembly has no metadata - {}", token))?;
    let member = image.member_reference(token)?;
    let scope = member.assembly.clone();
    frame.member = Some(member);

    match scope {
        None => {
            frame.executing = Some(Rc::clone(&frame.calling));
            transition(frame, FrameState::BindNative);
            Ok(ThreadStatus::Continue)
        }
        Some(name) => wait_for_assembly(frame, ctx, name),
    }
}

fn wait_for_assembly(
    frame: &mut CallFrame,
    ctx: &mut DomainContext,
    name: String,
) -> Result<ThreadStatus> {
    match ctx.assemblies.request(&name) {
        LoadState::Loaded(assembly) => {
            frame.executing = Some(assembly);
            transition(frame, FrameState::BindNative);
            Ok(ThreadStatus::Continue)
        }
        LoadState::Failed => Err(EmulationError::AssemblyNotFound { name }.into()),
        LoadState::Pending | LoadState::Unknown => {
            if frame.state != FrameState::WaitForAssembly(name.clone()) {
                transition(frame, FrameState::WaitForAssembly(name.clone()));
            }
            Ok(ThreadStatus::Blocked(BlockReason::AssemblyLoad(name)))
        }
    }
}

fn bind(frame: &mut CallFrame, stack: &mut EvaluationStack) -> Result<ThreadStatus> {
    let assembly = executing(frame)?;
    let Some(member) = frame.member.as_ref() else {
        return Err(malformed_error!("Frame has no member to bind - {}", frame.token));
    };

    if let Some(library) = assembly.library() {
        let signature = parse_method_signature(&member.signature)?;
        let type_name = member.full_type_name();
        let key = native_key(&member.name, &signature);
        let Some(method) = library.bind(&type_name, &key) else {
            return Err(EmulationError::NativeMethodNotFound {
                type_name,
                method: key,
            }
            .into());
        };

        frame.arguments = stack.pop_n(signature.stack_arguments())?;
        frame.native = Some(method);
        transition(frame, FrameState::Executing);
        return Ok(ThreadStatus::Continue);
    }

    let Some(image) = assembly.image() else {
        return Err(malformed_error!("Assembly {} is empty", assembly.name()));
    };
    let Some(token) = image
        .find_type(&member.namespace, &member.type_name)
        .and_then(|rid| image.find_method(rid, &member.name, &member.signature))
    else {
        return Err(EmulationError::MethodNotFound {
            type_name: member.full_type_name(),
            name: member.name.clone(),
        }
        .into());
    };

    frame.code = Some(assembly.method(token)?);
    transition(frame, FrameState::SetupLocals);
    Ok(ThreadStatus::Continue)
}

fn setup_locals(
    frame: &mut CallFrame,
    stack: &mut EvaluationStack,
    ctx: &mut DomainContext,
) -> Result<ThreadStatus> {
    let code = match &frame.code {
        Some(code) => Rc::clone(code),
        None => {
            let code = executing(frame)?.method(frame.token)?;
            frame.code = Some(Rc::clone(&code));
            code
        }
    };

    frame.arguments = stack.pop_n(code.signature.stack_arguments())?;
    frame.locals.reserve(code.locals.len());
    for local in &code.locals {
        let slot = if local.is_byref {
            LocalSlot::Managed(EmValue::Null)
        } else if code.body.is_init_local {
            match CellType::for_signature(&local.base)? {
                Some(ty) => LocalSlot::Cell {
                    offset: ctx.heap.alloc(ty.size())?,
                    ty,
                },
                None => LocalSlot::Managed(EmValue::Null),
            }
        } else if local.base.is_float() {
            return Err(crate::Error::NotSupported);
        } else {
            LocalSlot::Managed(EmValue::zero_for(&local.base))
        };
        frame.locals.push(slot);
    }

    frame.ip = 0;
    debug!(
        "Entering {} with {} arguments and {} locals",
        code.name,
        frame.arguments.len(),
        frame.locals.len()
    );
    transition(frame, FrameState::Executing);
    Ok(ThreadStatus::Continue)
}
