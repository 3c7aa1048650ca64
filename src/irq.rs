//! # Interrupt masking
//!
//! A spinlock shared between normal code and an interrupt handler on the same
//! core can deadlock: the handler preempts the holder and spins on a lock that
//! cannot be released until the handler returns. The fix is to mask that
//! interrupt source for as long as the lock is held.
//!
//! [`InterruptMask`] is the boundary to whatever controls interrupt delivery.
//! [`SpinLock::lock_masked`] and [`RawSpinLock::with_masked`] save the
//! source's mask state and mask it before acquiring, then release the lock
//! and restore the *saved* state, so masked regions nest correctly.
//!
//! Implementations:
//! - [`SimulatedInterrupts`]: a host-side model of one core that delivers a
//!   raised interrupt immediately when unmasked and defers it otherwise.
//! - `MachineInterrupts` (RISC-V only): the `mie` CSR.
//!
//! ```rust
//! use word_spinlock::{IrqSource, SimulatedInterrupts, SpinLock};
//!
//! let ticks = SpinLock::new(0u32);
//! let handler = |_: IrqSource| *ticks.lock() += 1;
//!
//! let irq = SimulatedInterrupts::new();
//! irq.set_handler(IrqSource::MachineTimer, &handler);
//!
//! {
//!     let mut guard = ticks.lock_masked(&irq, IrqSource::MachineTimer);
//!     irq.raise(IrqSource::MachineTimer); // deferred, the lock is held
//!     *guard += 10;
//! } // lock released, then the timer fires
//!
//! assert_eq!(*ticks.lock(), 11);
//! ```

use core::cell::Cell;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use bitflags::bitflags;

use crate::raw::RawSpinLock;
use crate::spinlock::{SpinGuard, SpinLock};

/// Interrupt sources, numbered by their RISC-V `mie` / `mip` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IrqSource {
    SupervisorSoft = 1,
    MachineSoft = 3,
    SupervisorTimer = 5,
    MachineTimer = 7,
    SupervisorExternal = 9,
    MachineExternal = 11,
}

impl IrqSource {
    /// Every source, in ascending bit order (also the delivery priority of
    /// the simulator).
    pub const ALL: [IrqSource; 6] = [
        IrqSource::SupervisorSoft,
        IrqSource::MachineSoft,
        IrqSource::SupervisorTimer,
        IrqSource::MachineTimer,
        IrqSource::SupervisorExternal,
        IrqSource::MachineExternal,
    ];

    /// The source's bit in `mie`.
    #[inline(always)]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// A one-element [`IrqSet`].
    #[inline(always)]
    pub const fn as_set(self) -> IrqSet {
        IrqSet::from_bits_retain(self.bit())
    }

    const fn index(self) -> usize {
        match self {
            IrqSource::SupervisorSoft => 0,
            IrqSource::MachineSoft => 1,
            IrqSource::SupervisorTimer => 2,
            IrqSource::MachineTimer => 3,
            IrqSource::SupervisorExternal => 4,
            IrqSource::MachineExternal => 5,
        }
    }
}

bitflags! {
    /// A set of interrupt sources, laid out like the `mie` register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqSet: u32 {
        const SUPERVISOR_SOFT = 1 << 1;
        const MACHINE_SOFT = 1 << 3;
        const SUPERVISOR_TIMER = 1 << 5;
        const MACHINE_TIMER = 1 << 7;
        const SUPERVISOR_EXTERNAL = 1 << 9;
        const MACHINE_EXTERNAL = 1 << 11;
    }
}

/// Mask state of one source captured by [`InterruptMask::save_and_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "dropping a MaskState leaves the source masked"]
pub struct MaskState {
    source: IrqSource,
    was_enabled: bool,
}

impl MaskState {
    /// The source this state was captured for.
    pub fn source(&self) -> IrqSource {
        self.source
    }

    /// Whether the source was unmasked before the save.
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

/// Per-source interrupt enable control on the current core.
pub trait InterruptMask {
    /// Stops delivery of `source`. Raised interrupts stay pending.
    fn mask(&self, source: IrqSource);

    /// Re-enables delivery of `source`.
    fn unmask(&self, source: IrqSource);

    /// Whether delivery of `source` is currently disabled.
    fn is_masked(&self, source: IrqSource) -> bool;

    /// Masks `source` and returns its previous state.
    fn save_and_mask(&self, source: IrqSource) -> MaskState {
        let was_enabled = !self.is_masked(source);
        self.mask(source);
        MaskState { source, was_enabled }
    }

    /// Puts the source back the way [`save_and_mask`](Self::save_and_mask)
    /// found it. A source that was already masked stays masked.
    fn restore(&self, state: MaskState) {
        if state.was_enabled {
            self.unmask(state.source);
        }
    }
}

/// Guard returned by [`SpinLock::lock_masked`].
///
/// On drop the lock is released first and the interrupt source restored
/// second, so a deferred handler runs against a free lock.
#[must_use = "if unused the SpinLock will immediately unlock"]
pub struct MaskedGuard<'a, T, M: InterruptMask + ?Sized> {
    guard: ManuallyDrop<SpinGuard<'a, T>>,
    irq: &'a M,
    state: MaskState,
}

impl<T, M: InterruptMask + ?Sized> Drop for MaskedGuard<'_, T, M> {
    fn drop(&mut self) {
        // SAFETY: dropped exactly once, here, and never touched afterwards.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.irq.restore(self.state);
    }
}

impl<T, M: InterruptMask + ?Sized> Deref for MaskedGuard<'_, T, M> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, M: InterruptMask + ?Sized> DerefMut for MaskedGuard<'_, T, M> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> SpinLock<T> {
    /// Masks `source`, then acquires the lock.
    ///
    /// Required whenever a handler for `source` on this core may also take
    /// this lock.
    pub fn lock_masked<'a, M: InterruptMask + ?Sized>(
        &'a self,
        irq: &'a M,
        source: IrqSource,
    ) -> MaskedGuard<'a, T, M> {
        let state = irq.save_and_mask(source);
        let guard = self.lock();
        MaskedGuard {
            guard: ManuallyDrop::new(guard),
            irq,
            state,
        }
    }

    /// Non-spinning [`lock_masked`](Self::lock_masked). On failure the
    /// source's mask state is restored before returning.
    pub fn try_lock_masked<'a, M: InterruptMask + ?Sized>(
        &'a self,
        irq: &'a M,
        source: IrqSource,
    ) -> Option<MaskedGuard<'a, T, M>> {
        let state = irq.save_and_mask(source);
        match self.try_lock() {
            Some(guard) => Some(MaskedGuard {
                guard: ManuallyDrop::new(guard),
                irq,
                state,
            }),
            None => {
                irq.restore(state);
                None
            }
        }
    }
}

impl RawSpinLock {
    /// Runs `f` with `source` masked and the lock held.
    pub fn with_masked<M: InterruptMask + ?Sized, R>(
        &self,
        irq: &M,
        source: IrqSource,
        f: impl FnOnce() -> R,
    ) -> R {
        let state = irq.save_and_mask(source);
        let _restore = Restore { irq, state };
        self.with(f)
    }
}

/// Restores a saved mask state on drop, including during unwinding.
struct Restore<'a, M: InterruptMask + ?Sized> {
    irq: &'a M,
    state: MaskState,
}

impl<M: InterruptMask + ?Sized> Drop for Restore<'_, M> {
    fn drop(&mut self) {
        self.irq.restore(self.state);
    }
}

/// Handler for a simulated interrupt source.
pub type Handler<'h> = &'h dyn Fn(IrqSource);

/// Single-core interrupt controller model for host-side testing.
///
/// All sources start unmasked. [`raise`](Self::raise) behaves like the
/// hardware asserting a line: if the source is enabled its handler runs right
/// away, preempting the caller; if it is masked the source becomes pending and
/// is delivered as soon as it is unmasked.
///
/// While a handler runs, delivery is globally off, as with `mstatus.MIE`
/// cleared on trap entry: anything raised is left pending until the handler
/// returns. The per-source enables stay untouched, so a handler that masks or
/// unmasks a source leaves that change in place.
pub struct SimulatedInterrupts<'h> {
    enabled: Cell<IrqSet>,
    pending: Cell<IrqSet>,
    in_handler: Cell<bool>,
    handlers: [Cell<Option<Handler<'h>>>; 6],
    delivered: Cell<u32>,
}

impl<'h> SimulatedInterrupts<'h> {
    /// A controller with every source unmasked and no handlers.
    pub fn new() -> Self {
        Self {
            enabled: Cell::new(IrqSet::all()),
            pending: Cell::new(IrqSet::empty()),
            in_handler: Cell::new(false),
            handlers: Default::default(),
            delivered: Cell::new(0),
        }
    }

    /// Installs the handler for `source`, replacing any previous one.
    pub fn set_handler(&self, source: IrqSource, handler: Handler<'h>) {
        self.handlers[source.index()].set(Some(handler));
    }

    /// Asserts `source`: delivers it now if enabled and no handler is
    /// running, otherwise leaves it pending.
    pub fn raise(&self, source: IrqSource) {
        if self.in_handler.get() {
            log::debug!("{:?} raised inside a handler, deferring", source);
            self.pending.set(self.pending.get() | source.as_set());
        } else if self.enabled.get().contains(source.as_set()) {
            self.dispatch(source);
        } else {
            log::debug!("{:?} masked, deferring", source);
            self.pending.set(self.pending.get() | source.as_set());
        }
    }

    /// Whether a handler is running right now.
    pub fn in_handler(&self) -> bool {
        self.in_handler.get()
    }

    /// Sources raised while masked and not yet delivered.
    pub fn pending(&self) -> IrqSet {
        self.pending.get()
    }

    /// Number of interrupts delivered so far.
    pub fn delivered(&self) -> u32 {
        self.delivered.get()
    }

    fn dispatch(&self, source: IrqSource) {
        self.in_handler.set(true);
        self.delivered.set(self.delivered.get() + 1);
        match self.handlers[source.index()].get() {
            Some(handler) => {
                log::debug!("delivering {:?}", source);
                handler(source);
            }
            None => log::debug!("{:?} has no handler, dropped", source),
        }
        self.in_handler.set(false);
        self.deliver_pending();
    }

    fn deliver_pending(&self) {
        if self.in_handler.get() {
            return;
        }
        loop {
            let ready = self.pending.get() & self.enabled.get();
            let Some(source) = IrqSource::ALL
                .into_iter()
                .find(|s| ready.contains(s.as_set()))
            else {
                return;
            };
            self.pending.set(self.pending.get() - source.as_set());
            self.dispatch(source);
        }
    }
}

impl Default for SimulatedInterrupts<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptMask for SimulatedInterrupts<'_> {
    fn mask(&self, source: IrqSource) {
        self.enabled.set(self.enabled.get() - source.as_set());
    }

    fn unmask(&self, source: IrqSource) {
        self.enabled.set(self.enabled.get() | source.as_set());
        self.deliver_pending();
    }

    /// Per-source state only, like `mie`; a running handler does not count.
    fn is_masked(&self, source: IrqSource) -> bool {
        !self.enabled.get().contains(source.as_set())
    }
}

/// The machine-mode `mie` CSR of the current hart.
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineInterrupts;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl InterruptMask for MachineInterrupts {
    fn mask(&self, source: IrqSource) {
        use riscv::register::mie;
        unsafe {
            match source {
                IrqSource::SupervisorSoft => mie::clear_ssoft(),
                IrqSource::MachineSoft => mie::clear_msoft(),
                IrqSource::SupervisorTimer => mie::clear_stimer(),
                IrqSource::MachineTimer => mie::clear_mtimer(),
                IrqSource::SupervisorExternal => mie::clear_sext(),
                IrqSource::MachineExternal => mie::clear_mext(),
            }
        }
    }

    fn unmask(&self, source: IrqSource) {
        use riscv::register::mie;
        unsafe {
            match source {
                IrqSource::SupervisorSoft => mie::set_ssoft(),
                IrqSource::MachineSoft => mie::set_msoft(),
                IrqSource::SupervisorTimer => mie::set_stimer(),
                IrqSource::MachineTimer => mie::set_mtimer(),
                IrqSource::SupervisorExternal => mie::set_sext(),
                IrqSource::MachineExternal => mie::set_mext(),
            }
        }
    }

    fn is_masked(&self, source: IrqSource) -> bool {
        let mie = riscv::register::mie::read();
        let enabled = match source {
            IrqSource::SupervisorSoft => mie.ssoft(),
            IrqSource::MachineSoft => mie.msoft(),
            IrqSource::SupervisorTimer => mie.stimer(),
            IrqSource::MachineTimer => mie.mtimer(),
            IrqSource::SupervisorExternal => mie.sext(),
            IrqSource::MachineExternal => mie.mext(),
        };
        !enabled
    }
}
