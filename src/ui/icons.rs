//! Shared UI icons.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static SPLIT: Emoji<'_, '_> = Emoji("🔀 ", "[S]");
pub static MERGE: Emoji<'_, '_> = Emoji("🔗 ", "[M]");
pub static TEST: Emoji<'_, '_> = Emoji("🧪 ", "[T]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[X]");
