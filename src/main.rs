//! # Voxel Section Renderer Demo
//!
//! Runs the library's headless demo.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    voxel_section_renderer::run();
}
