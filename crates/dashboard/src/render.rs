//! Rendering of dashboard state.
//!
//! [`PageView`] is a plain description of what is on screen, built from
//! [`ListState`]. It renders as text for the terminal ([`std::fmt::Display`])
//! or as an HTML fragment ([`PageView::to_html`]).

use std::fmt;

use crate::view::{Card, LaunchState, ListState};

/// Placeholder shown while the list is in flight.
pub const LOADING_TEXT: &str = "loading...";
/// Terminal message shown when the list cannot be fetched.
pub const FAILED_TEXT: &str = "failed to load";

/// Height of the embedded instance frame.
const FRAME_HEIGHT: &str = "800px";

/// What the user can press on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Launch,
    Launching,
    Retry,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Self::Launch => "Launch",
            Self::Launching => "Launching...",
            Self::Retry => "Retry",
        }
    }
}

/// One rendered card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub title: String,
    pub subtitle: String,
    pub control: Control,
    /// `Run: {run_id}` once a launch succeeded.
    pub run_line: Option<String>,
    pub description: Option<String>,
    pub raw_json: String,
    /// Launch failure message.
    pub error: Option<String>,
    /// Source of the embedded frame, exactly `http://{host}:{port}`.
    pub frame_src: Option<String>,
}

impl CardView {
    pub fn from_card(card: &Card) -> Self {
        let workflow = &card.workflow;
        let (control, run_line, error, frame_src) = match &card.launch {
            LaunchState::Idle => (Control::Launch, None, None, None),
            LaunchState::Pending => (Control::Launching, None, None, None),
            LaunchState::HasResult(result) => (
                Control::Launch,
                Some(format!("Run: {}", result.run_id)),
                None,
                Some(result.frame_url()),
            ),
            LaunchState::Failed { message } => {
                (Control::Retry, None, Some(message.clone()), None)
            }
        };

        Self {
            title: workflow.display_name().to_string(),
            subtitle: workflow.id.clone(),
            control,
            run_line,
            description: workflow.description.clone(),
            raw_json: workflow.raw_json(),
            error,
            frame_src,
        }
    }
}

/// The whole page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageView {
    Loading,
    FailedToLoad,
    Workflows {
        cards: Vec<CardView>,
        /// Records refused at the boundary; reported, never rendered.
        quarantined: usize,
    },
}

impl PageView {
    pub fn from_state(state: &ListState) -> Self {
        match state {
            ListState::Loading => Self::Loading,
            ListState::Failed { .. } => Self::FailedToLoad,
            ListState::Loaded { cards, quarantined } => Self::Workflows {
                cards: cards.iter().map(CardView::from_card).collect(),
                quarantined: quarantined.len(),
            },
        }
    }

    /// Render as an HTML fragment. All text is escaped.
    pub fn to_html(&self) -> String {
        match self {
            Self::Loading => format!("<div>{LOADING_TEXT}</div>"),
            Self::FailedToLoad => format!("<div>{FAILED_TEXT}</div>"),
            Self::Workflows { cards, quarantined } => {
                let mut html = String::from("<div>\n<h1>Workflows</h1>\n");
                if *quarantined > 0 {
                    html.push_str(&format!(
                        "<p class=\"quarantine\">{quarantined} malformed record(s) hidden</p>\n"
                    ));
                }
                html.push_str("<ul>\n");
                for card in cards {
                    html.push_str(&card_html(card));
                }
                html.push_str("</ul>\n</div>");
                html
            }
        }
    }
}

fn card_html(card: &CardView) -> String {
    let mut html = format!(
        "<li data-workflow-id=\"{id}\">\n<h2>{title}</h2>\n<button>{control}</button>\n<p>{id}</p>\n",
        id = escape(&card.subtitle),
        title = escape(&card.title),
        control = card.control.label(),
    );
    if let Some(run_line) = &card.run_line {
        html.push_str(&format!("<p>{}</p>\n", escape(run_line)));
    }
    if let Some(error) = &card.error {
        html.push_str(&format!("<p class=\"error\">{}</p>\n", escape(error)));
    }
    if let Some(description) = &card.description {
        html.push_str(&format!("<p>{}</p>\n", escape(description)));
    }
    html.push_str(&format!("<pre>{}</pre>\n", escape(&card.raw_json)));
    if let Some(src) = &card.frame_src {
        html.push_str(&format!(
            "<iframe src=\"{}\" width=\"100%\" height=\"{FRAME_HEIGHT}\"></iframe>\n",
            escape(src)
        ));
    }
    html.push_str("</li>\n");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for CardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  [{}]", self.title, self.control.label())?;
        writeln!(f, "  {}", self.subtitle)?;
        if let Some(run_line) = &self.run_line {
            writeln!(f, "  {run_line}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  error: {error}")?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "  {description}")?;
        }
        writeln!(f, "  {}", self.raw_json)?;
        if let Some(src) = &self.frame_src {
            writeln!(f, "  frame: {src}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => writeln!(f, "{LOADING_TEXT}"),
            Self::FailedToLoad => writeln!(f, "{FAILED_TEXT}"),
            Self::Workflows { cards, quarantined } => {
                writeln!(f, "Workflows")?;
                if *quarantined > 0 {
                    writeln!(f, "({quarantined} malformed record(s) hidden)")?;
                }
                for card in cards {
                    writeln!(f)?;
                    write!(f, "{card}")?;
                }
                Ok(())
            }
        }
    }
}
