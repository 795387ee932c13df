//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the canvas rules and the persistence mirror so route
//! handlers can stay focused on protocol translation. Leaf modules
//! (`validate`, `simplify`, `shapes`, `history`) are pure; `canvas` composes
//! them over the shared `CanvasState`.

pub mod canvas;
pub mod history;
pub mod persistence;
pub mod session;
pub mod shapes;
pub mod simplify;
pub mod validate;
