// Draft model: picks, positions, and the shared draft state.

pub mod pick;
pub mod state;
