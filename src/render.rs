//! Output rendering for streamed replies.
//!
//! The [`FenceScanner`](crate::FenceScanner) decides what every character
//! is; a [`Renderer`] decides what that looks like.  [`render_instruction`]
//! connects the two.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::blocks::BlockId;
use crate::fence::RenderInstruction;

const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_ITALIC: &str = "\x1b[3m";
const ANSI_RESET: &str = "\x1b[0m";

/// Colour of the model's prose.
pub const REPLY_COLOR: &str = "\x1b[38;5;99m";

/// Colour of fenced code and language tags.
pub const BLOCK_COLOR: &str = "\x1b[38;5;200m";

/// Colour of the user prompt and user messages.
pub const USER_COLOR: &str = "\x1b[38;5;75m";

/// Colour of informational messages and block markers.
pub const INFO_COLOR: &str = "\x1b[38;5;30m";

/// Colour of errors.
pub const ERROR_COLOR: &str = "\x1b[38;5;1m";

/// Trait for rendering streamed replies and chat feedback.
///
/// Every method is expected to write (and flush) immediately so the reply
/// appears as it is typed.
pub trait Renderer: Send {
    /// Called before the first fragment of a reply.
    fn start_response(&mut self) {}

    /// Print prose text.
    fn print_prose(&mut self, text: &str);

    /// Print text from inside a code fence.
    fn print_code(&mut self, text: &str);

    /// Print the language tag of a code block.
    fn print_language_tag(&mut self, tag: &str);

    /// Print the marker that follows a closed code block.
    fn print_block_closed(&mut self, id: BlockId);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Called when the reply is cut short by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should stop.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Routes one scanner instruction to the matching renderer call.
pub fn render_instruction(renderer: &mut dyn Renderer, instruction: &RenderInstruction) {
    let mut buf = [0u8; 4];
    match instruction {
        RenderInstruction::Prose(c) => renderer.print_prose(c.encode_utf8(&mut buf)),
        RenderInstruction::CodeChar(c) => renderer.print_code(c.encode_utf8(&mut buf)),
        RenderInstruction::LanguageTag(tag) => renderer.print_language_tag(tag),
        RenderInstruction::BlockClosed(id) => renderer.print_block_closed(*id),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Style {
    Plain,
    Prose,
    Code,
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    style: Style,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            style: Style::Plain,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Creates a new PlainTextRenderer with specified color and interrupt flag.
    pub fn with_color_and_interrupt(use_color: bool, interrupted: Arc<AtomicBool>) -> Self {
        Self::with_color(use_color).with_interrupt(interrupted)
    }

    /// Returns whether ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn switch_style(&mut self, style: Style) {
        if self.style == style {
            return;
        }
        if self.use_color {
            match style {
                Style::Plain => print!("{ANSI_RESET}"),
                Style::Prose => print!("{ANSI_RESET}{REPLY_COLOR}"),
                Style::Code => print!("{ANSI_ITALIC}{BLOCK_COLOR}"),
            }
        }
        self.style = style;
    }

    fn reset_styles(&mut self) {
        self.switch_style(Style::Plain);
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        self.reset_styles();
        if self.use_color {
            print!("{REPLY_COLOR}GPT: ");
        } else {
            print!("GPT: ");
        }
        self.style = Style::Prose;
        self.flush();
    }

    fn print_prose(&mut self, text: &str) {
        self.switch_style(Style::Prose);
        print!("{text}");
        self.flush();
    }

    fn print_code(&mut self, text: &str) {
        self.switch_style(Style::Code);
        print!("{text}");
        self.flush();
    }

    fn print_language_tag(&mut self, tag: &str) {
        if self.use_color {
            println!("{ANSI_RESET}{ANSI_BOLD}{BLOCK_COLOR}{tag}{ANSI_RESET}");
        } else {
            println!("{tag}");
        }
        self.style = Style::Plain;
        self.flush();
    }

    fn print_block_closed(&mut self, id: BlockId) {
        if self.use_color {
            println!("\n{ANSI_RESET}{INFO_COLOR}╚═ !copy {id} ═╝");
        } else {
            println!("\n╚═ !copy {id} ═╝");
        }
        self.style = Style::Plain;
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.reset_styles();
        if self.use_color {
            eprintln!("{ERROR_COLOR}{error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.reset_styles();
        if self.use_color {
            println!("{INFO_COLOR}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
        self.flush();
    }

    fn finish_response(&mut self) {
        self.reset_styles();
        println!();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.reset_styles();
        println!("\n[interrupted]");
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
