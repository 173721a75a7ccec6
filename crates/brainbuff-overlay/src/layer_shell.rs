use brainbuff_core::geometry::OverlayPosition;
use gtk4_layer_shell::{Edge, KeyboardMode, Layer, LayerShell};
use tracing::info;

/// Try to initialize the window as a layer-shell surface (for wlroots compositors).
/// Returns true if layer-shell was successfully applied.
/// NOTE: GNOME Wayland does not support wlr-layer-shell. The card falls back to a
/// regular window, which may not appear above fullscreen apps or position correctly.
pub fn try_init_layer_shell(
    window: &gtk4::Window,
    monitor: Option<&gtk4::gdk::Monitor>,
    position: OverlayPosition,
    margin: i32,
) -> bool {
    if !gtk4_layer_shell::is_supported() {
        info!("layer-shell not supported on this compositor");
        return false;
    }

    window.init_layer_shell();
    window.set_layer(Layer::Overlay);
    // Never steal focus from what the user was doing; answers come from
    // clicks or the daemon's digit hotkeys.
    window.set_keyboard_mode(KeyboardMode::None);
    // Pin to the same monitor the reported card geometry is computed on.
    window.set_monitor(monitor);

    let top_right = position == OverlayPosition::TopRight;
    window.set_anchor(Edge::Top, top_right);
    window.set_anchor(Edge::Right, top_right);
    window.set_anchor(Edge::Bottom, false);
    window.set_anchor(Edge::Left, false);
    if top_right {
        window.set_margin(Edge::Top, margin);
        window.set_margin(Edge::Right, margin);
    }

    // Use exclusive zone of -1 to not reserve space
    window.set_exclusive_zone(-1);

    info!(?position, "layer-shell initialized");
    true
}
