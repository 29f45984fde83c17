//! Call frames and their lifecycle states.

use std::{fmt, rc::Rc};

use crate::{
    emulation::{
        runtime::{Assembly, NativeMethod},
        EmValue, EmulationError, Heap, MethodCode,
    },
    metadata::{
        cilimage::{CilImage, MemberReference},
        signatures::TypeSignature,
        token::Token,
    },
    Result,
};

/// Lifecycle state of a [`CallFrame`].
///
/// A frame moves forward through `ResolveToken`, `SetupLocals` (IL methods) or
/// `WaitForAssembly` / `BindNative` (members of other assemblies), `Executing` and finally
/// `Unwind`, after which it is popped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Find out which assembly and method the frame token denotes
    ResolveToken,
    /// Parked until the named assembly finished loading
    WaitForAssembly(String),
    /// Bind the member to a native method or a `MethodDef` of the resolved assembly
    BindNative,
    /// Prepare the method code, pop the arguments and lay out the locals
    SetupLocals,
    /// Running IL or a native method
    Executing,
    /// Release the frame's resources
    Unwind,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameState::ResolveToken => write!(f, "ResolveToken"),
            FrameState::WaitForAssembly(name) => write!(f, "WaitForAssembly({name})"),
            FrameState::BindNative => write!(f, "BindNative"),
            FrameState::SetupLocals => write!(f, "SetupLocals"),
            FrameState::Executing => write!(f, "Executing"),
            FrameState::Unwind => write!(f, "Unwind"),
        }
    }
}

/// Width and signedness of a primitive local stored in a heap cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellType {
    /// `int8`
    I1,
    /// `bool`, `uint8`
    U1,
    /// `int16`
    I2,
    /// `char`, `uint16`
    U2,
    /// `int32`, `uint32`
    I4,
    /// `int64`, `uint64`, `native int`, `native uint`
    I8,
}

impl CellType {
    /// The cell type of a primitive signature, `None` for reference types.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for floating point types.
    pub fn for_signature(signature: &TypeSignature) -> Result<Option<CellType>> {
        let cell = match signature {
            TypeSignature::I1 => CellType::I1,
            TypeSignature::Boolean | TypeSignature::U1 => CellType::U1,
            TypeSignature::I2 => CellType::I2,
            TypeSignature::Char | TypeSignature::U2 => CellType::U2,
            TypeSignature::I4 | TypeSignature::U4 => CellType::I4,
            TypeSignature::I8 | TypeSignature::U8 | TypeSignature::I | TypeSignature::U => {
                CellType::I8
            }
            TypeSignature::R4 | TypeSignature::R8 => return Err(crate::Error::NotSupported),
            _ => return Ok(None),
        };

        Ok(Some(cell))
    }

    /// Size of the cell in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            CellType::I1 | CellType::U1 => 1,
            CellType::I2 | CellType::U2 => 2,
            CellType::I4 => 4,
            CellType::I8 => 8,
        }
    }
}

/// Storage of one local variable.
#[derive(Clone, Debug, PartialEq)]
pub enum LocalSlot {
    /// Held directly by the frame; visible to the collector
    Managed(EmValue),
    /// A zero-initialized primitive cell of the heap
    Cell {
        /// Payload offset returned by [`Heap::alloc`]
        offset: usize,
        /// Width of the cell
        ty: CellType,
    },
}

impl LocalSlot {
    /// Read the current value.
    ///
    /// # Errors
    /// Returns [`EmulationError::HeapCorruption`] if the cell lies outside the heap.
    pub fn load(&self, heap: &Heap) -> Result<EmValue> {
        let (offset, ty) = match self {
            LocalSlot::Managed(value) => return Ok(value.clone()),
            LocalSlot::Cell { offset, ty } => (*offset, *ty),
        };

        Ok(match ty {
            CellType::I1 => EmValue::Int32(i32::from(heap.read::<i8>(offset)?)),
            CellType::U1 => EmValue::Int32(i32::from(heap.read::<u8>(offset)?)),
            CellType::I2 => EmValue::Int32(i32::from(heap.read::<i16>(offset)?)),
            CellType::U2 => EmValue::Int32(i32::from(heap.read::<u16>(offset)?)),
            CellType::I4 => EmValue::Int32(heap.read_i32(offset)?),
            CellType::I8 => EmValue::Int64(heap.read_i64(offset)?),
        })
    }

    /// Replace the current value; cells truncate to their width.
    ///
    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] when storing a reference into a cell.
    #[allow(clippy::cast_possible_truncation)]
    pub fn store(&mut self, value: EmValue, heap: &mut Heap) -> Result<()> {
        match self {
            LocalSlot::Managed(slot) => {
                *slot = value;
                Ok(())
            }
            LocalSlot::Cell { offset, ty } => {
                let offset = *offset;
                let raw = value.as_i64("stloc")?;
                match ty {
                    CellType::I1 | CellType::U1 => heap.write::<u8>(offset, raw as u8),
                    CellType::I2 | CellType::U2 => heap.write::<u16>(offset, raw as u16),
                    CellType::I4 => heap.write_i32(offset, raw as i32),
                    CellType::I8 => heap.write_i64(offset, raw),
                }
            }
        }
    }
}

/// One activation of a method on a thread's call stack.
///
/// Arguments and locals live in the frame; the operand stack is shared by all frames of the
/// thread, so a callee pops its arguments from and leaves its return value on the caller's
/// operands.
pub struct CallFrame {
    pub(crate) token: Token,
    pub(crate) state: FrameState,
    pub(crate) ip: usize,
    pub(crate) calling: Rc<Assembly>,
    pub(crate) executing: Option<Rc<Assembly>>,
    pub(crate) member: Option<MemberReference>,
    pub(crate) code: Option<Rc<MethodCode>>,
    pub(crate) native: Option<NativeMethod>,
    pub(crate) arguments: Vec<EmValue>,
    pub(crate) locals: Vec<LocalSlot>,
}

impl CallFrame {
    /// A frame calling `token` from code of `calling`.
    #[must_use]
    pub fn new(token: Token, calling: Rc<Assembly>) -> CallFrame {
        CallFrame {
            token,
            state: FrameState::ResolveToken,
            ip: 0,
            calling,
            executing: None,
            member: None,
            code: None,
            native: None,
            arguments: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// The token the frame was created for (`MethodDef` or `MemberRef`).
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Offset of the next instruction within the IL body.
    #[must_use]
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// The assembly whose code issued the call.
    #[must_use]
    pub fn calling(&self) -> &Rc<Assembly> {
        &self.calling
    }

    /// The assembly declaring the method, once resolved.
    #[must_use]
    pub fn executing(&self) -> Option<&Rc<Assembly>> {
        self.executing.as_ref()
    }

    /// The prepared method code of an IL frame.
    #[must_use]
    pub fn code(&self) -> Option<&Rc<MethodCode>> {
        self.code.as_ref()
    }

    /// Name of the method, once resolved.
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.code
            .as_ref()
            .map(|code| code.name.as_str())
            .or_else(|| self.member.as_ref().map(|member| member.name.as_str()))
    }

    /// The image of the executing assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the frame runs no IL.
    pub fn image(&self) -> Result<&CilImage> {
        self.executing
            .as_ref()
            .and_then(|assembly| assembly.image())
            .ok_or_else(|| malformed_error!("Frame is not executing IL - {}", self.token))
    }

    /// The arguments passed to the frame.
    #[must_use]
    pub fn arguments(&self) -> &[EmValue] {
        &self.arguments
    }

    /// A copy of argument `index`.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArgumentIndexOutOfBounds`] for an undeclared argument.
    pub fn argument(&self, index: usize) -> Result<EmValue> {
        self.arguments.get(index).cloned().ok_or_else(|| {
            EmulationError::ArgumentIndexOutOfBounds {
                index,
                count: self.arguments.len(),
            }
            .into()
        })
    }

    /// Overwrite argument `index`.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArgumentIndexOutOfBounds`] for an undeclared argument.
    pub fn set_argument(&mut self, index: usize, value: EmValue) -> Result<()> {
        let count = self.arguments.len();
        let Some(slot) = self.arguments.get_mut(index) else {
            return Err(EmulationError::ArgumentIndexOutOfBounds { index, count }.into());
        };

        *slot = value;
        Ok(())
    }

    /// Load local `index`.
    ///
    /// # Errors
    /// Returns [`EmulationError::LocalIndexOutOfBounds`] for an undeclared local.
    pub fn load_local(&self, index: usize, heap: &Heap) -> Result<EmValue> {
        let Some(slot) = self.locals.get(index) else {
            return Err(EmulationError::LocalIndexOutOfBounds {
                index,
                count: self.locals.len(),
            }
            .into());
        };

        slot.load(heap)
    }

    /// Store into local `index`.
    ///
    /// # Errors
    /// Returns [`EmulationError::LocalIndexOutOfBounds`] for an undeclared local, or any error
    /// of [`LocalSlot::store`].
    pub fn store_local(&mut self, index: usize, value: EmValue, heap: &mut Heap) -> Result<()> {
        let count = self.locals.len();
        let Some(slot) = self.locals.get_mut(index) else {
            return Err(EmulationError::LocalIndexOutOfBounds { index, count }.into());
        };

        slot.store(value, heap)
    }

    /// Values the collector treats as roots: arguments and managed locals.
    pub fn roots(&self) -> impl Iterator<Item = &EmValue> {
        self.arguments
            .iter()
            .chain(self.locals.iter().filter_map(|slot| match slot {
                LocalSlot::Managed(value) => Some(value),
                LocalSlot::Cell { .. } => None,
            }))
    }

    /// Return every heap cell of the frame to the allocator.
    ///
    /// # Errors
    /// Returns the allocator error of a cell that cannot be freed.
    pub fn release(&mut self, heap: &mut Heap) -> Result<()> {
        for slot in self.locals.drain(..) {
            if let LocalSlot::Cell { offset, .. } = slot {
                heap.free(offset)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("token", &self.token)
            .field("state", &self.state)
            .field("ip", &self.ip)
            .field("calling", &self.calling.name())
            .field("executing", &self.executing.as_ref().map(|a| a.name()))
            .field("arguments", &self.arguments)
            .field("locals", &self.locals)
            .finish_non_exhaustive()
    }
}
