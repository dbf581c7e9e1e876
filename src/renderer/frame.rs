use std::ops::{Index, IndexMut};

use crate::error::{AshError, Result};

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Index of a frame-in-flight slot, always `< FRAMES_IN_FLIGHT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSlot(u8);

impl FrameSlot {
    pub fn new(index: usize) -> Result<Self> {
        if index < FRAMES_IN_FLIGHT {
            Ok(Self(index as u8))
        } else {
            Err(AshError::InvalidFrameSlot {
                index,
                count: FRAMES_IN_FLIGHT,
            })
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn next(self) -> Self {
        Self(((self.index() + 1) % FRAMES_IN_FLIGHT) as u8)
    }

    pub fn all() -> impl Iterator<Item = FrameSlot> {
        (0..FRAMES_IN_FLIGHT as u8).map(FrameSlot)
    }
}

/// One value per frame-in-flight slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerFrame<T>([T; FRAMES_IN_FLIGHT]);

impl<T> PerFrame<T> {
    pub fn from_fn(mut f: impl FnMut(FrameSlot) -> T) -> Self {
        Self(std::array::from_fn(|i| f(FrameSlot(i as u8))))
    }

    pub fn try_from_fn(mut f: impl FnMut(FrameSlot) -> Result<T>) -> Result<Self> {
        let mut values = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for slot in FrameSlot::all() {
            values.push(f(slot)?);
        }
        Self::try_from_vec(values)
    }

    /// Takes ownership of exactly one value per slot.
    pub fn try_from_vec(values: Vec<T>) -> Result<Self> {
        let actual = values.len();
        <[T; FRAMES_IN_FLIGHT]>::try_from(values)
            .map(Self)
            .map_err(|_| AshError::FrameCountMismatch {
                expected: FRAMES_IN_FLIGHT,
                actual,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameSlot, &T)> {
        FrameSlot::all().zip(self.0.iter())
    }

    pub fn values(&self) -> &[T] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FRAMES_IN_FLIGHT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<T> Index<FrameSlot> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: FrameSlot) -> &T {
        &self.0[slot.index()]
    }
}

impl<T> IndexMut<FrameSlot> for PerFrame<T> {
    fn index_mut(&mut self, slot: FrameSlot) -> &mut T {
        &mut self.0[slot.index()]
    }
}

/// The frame being recorded: which slot it owns and its running number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Active swapchain image index; selects every per-frame resource.
    pub slot: FrameSlot,
    pub number: u64,
}

impl Frame {
    pub fn new(slot: FrameSlot, number: u64) -> Self {
        Self { slot, number }
    }

    pub fn first() -> Self {
        Self::new(FrameSlot(0), 0)
    }

    /// The following frame, cycling through the slots in order.
    pub fn next(self) -> Self {
        Self::new(self.slot.next(), self.number + 1)
    }
}
