//! Shared UI icons with plain-text fallbacks.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN] ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i] ");

// Protocol milestones
pub static HANDSHAKE: Emoji<'_, '_> = Emoji("🤝 ", "[JOIN] ");
pub static LOCK: Emoji<'_, '_> = Emoji("🔒 ", "[COMMIT] ");
pub static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[UP] ");
pub static SCALES: Emoji<'_, '_> = Emoji("⚖️  ", "[=] ");
pub static TROPHY: Emoji<'_, '_> = Emoji("🏆 ", "[RESULT] ");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T] ");
