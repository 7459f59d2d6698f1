//! UI Theme Module - Consistent color palette and style helpers
//!
//! Palette tokens instead of hard-coded colors, plus helpers mapping
//! container state, health and readiness to styles and icons.

use ratatui::style::{Color, Modifier, Style};

use stackwatch_core::readiness::ReadinessResult;
use stackwatch_core::snapshot::{HealthFlag, LifecycleState, ServiceSnapshot};

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (tertiary info, disabled)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Success state (running, ready)
    pub success: Color,
    /// Warning state (starting, restarting)
    pub warn: Color,
    /// Error state (dead, unhealthy, failed exit)
    pub error: Color,
    /// Selection background
    pub selection_bg: Color,
    /// Selection foreground
    pub selection_fg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    /// VS Code-esque dark theme
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255), // Light blue
            success: Color::Rgb(78, 201, 176),     // Teal green
            warn: Color::Rgb(220, 180, 100),       // Amber
            error: Color::Rgb(244, 135, 113),      // Coral red
            selection_bg: Color::Rgb(38, 79, 120), // Dark blue
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    /// Style for container lifecycle state
    pub fn state_style(&self, snapshot: Option<&ServiceSnapshot>) -> Style {
        let Some(snapshot) = snapshot else {
            return Style::default().fg(self.palette.text_muted);
        };
        let color = match snapshot.state {
            LifecycleState::Running => self.palette.success,
            LifecycleState::Created | LifecycleState::Restarting => self.palette.warn,
            LifecycleState::Exited if snapshot.exit_code.is_none_or(|c| c == 0) => {
                self.palette.text_dim
            }
            LifecycleState::Exited | LifecycleState::Dead | LifecycleState::Removing => {
                self.palette.error
            }
            LifecycleState::Paused | LifecycleState::Unknown => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    /// Icon for container lifecycle state
    pub fn state_icon(&self, snapshot: Option<&ServiceSnapshot>) -> &'static str {
        let Some(snapshot) = snapshot else {
            return "○";
        };
        match snapshot.state {
            LifecycleState::Running => "●",
            LifecycleState::Created => "◐",
            LifecycleState::Restarting => "⟲",
            LifecycleState::Exited if snapshot.exit_code.is_none_or(|c| c == 0) => "◌",
            LifecycleState::Exited | LifecycleState::Dead | LifecycleState::Removing => "✗",
            LifecycleState::Paused => "‖",
            LifecycleState::Unknown => "?",
        }
    }

    /// Style for Docker healthcheck results
    pub fn health_style(&self, health: Option<HealthFlag>) -> Style {
        let color = match health {
            Some(HealthFlag::Healthy) => self.palette.success,
            Some(HealthFlag::Starting) => self.palette.warn,
            Some(HealthFlag::Unhealthy) => self.palette.error,
            None => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    pub fn readiness_style(&self, readiness: Option<&ReadinessResult>) -> Style {
        match readiness {
            Some(r) if r.ready => Style::default().fg(self.palette.success),
            Some(_) => Style::default().fg(self.palette.warn),
            None => Style::default().fg(self.palette.text_muted),
        }
    }

    pub fn readiness_label(&self, readiness: Option<&ReadinessResult>) -> &'static str {
        match readiness {
            Some(r) if r.ready => "✓ ready",
            Some(_) => "… waiting",
            None => "  -",
        }
    }

    /// Style for key hints in footer
    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    /// Style for subtle borders
    pub fn subtle_border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    /// Style for focused borders
    pub fn focused_border_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    /// Style for selected items
    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn warn_style(&self) -> Style {
        Style::default().fg(self.palette.warn)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    /// Style for title text
    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }

    /// Style for section headers
    pub fn section_header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }
}
