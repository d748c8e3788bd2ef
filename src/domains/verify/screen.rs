use std::fmt;

use crate::domains::scan::CameraPanel;

pub const CAMERA_UNAVAILABLE: &str = "Could not start the camera";
pub const ENTER_CODE_PROMPT: &str = "Please enter a code";
pub const COMMUNICATION_ERROR: &str = "A communication error occurred";

/// Which inline error area a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTarget {
    Qr,
    Manual,
}

/// Follow-ups offered under a redeemed coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultAction {
    /// Reset and start the camera again
    Continue,
    /// Reset and stay idle
    End,
    /// Reset after a manual verification
    Next,
}

impl ResultAction {
    pub fn label(&self) -> &'static str {
        match self {
            ResultAction::Continue => "Verify next",
            ResultAction::End => "Finish",
            ResultAction::Next => "Verify next",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPanel {
    pub target_product: String,
    pub discount: String,
    pub actions: Vec<ResultAction>,
}

/// View model of the verification page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyScreen {
    pub title_visible: bool,
    pub camera_area_visible: bool,
    pub manual_area_visible: bool,
    pub qr_error: Option<String>,
    pub manual_error: Option<String>,
    pub result: Option<ResultPanel>,
    /// Blocking notice, e.g. the camera could not be started
    pub alert: Option<String>,
    pub camera: CameraPanel,
}

impl Default for VerifyScreen {
    fn default() -> Self {
        Self {
            title_visible: true,
            camera_area_visible: true,
            manual_area_visible: true,
            qr_error: None,
            manual_error: None,
            result: None,
            alert: None,
            camera: CameraPanel::idle(),
        }
    }
}

impl VerifyScreen {
    /// Replaces the page body with the redeemed coupon.
    pub fn show_result(&mut self, target_product: &str, discount: &str, actions: Vec<ResultAction>) {
        self.qr_error = None;
        self.manual_error = None;
        self.title_visible = false;
        self.camera_area_visible = false;
        self.manual_area_visible = false;
        self.result = Some(ResultPanel {
            target_product: target_product.to_string(),
            discount: discount.to_string(),
            actions,
        });
    }

    /// Shows `message` in one error area and hides the other.
    pub fn show_error(&mut self, target: ErrorTarget, message: &str) {
        match target {
            ErrorTarget::Qr => {
                self.qr_error = Some(message.to_string());
                self.manual_error = None;
            }
            ErrorTarget::Manual => {
                self.manual_error = Some(message.to_string());
                self.qr_error = None;
            }
        }
    }

    /// Brings back title, camera and manual areas and clears the result.
    pub fn reset(&mut self) {
        self.title_visible = true;
        self.camera_area_visible = true;
        self.manual_area_visible = true;
        self.result = None;
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }
}

impl fmt::Display for VerifyScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alert) = &self.alert {
            writeln!(f, "[!] {}", alert)?;
        }

        if let Some(result) = &self.result {
            writeln!(f, "=== Coupon redeemed ===")?;
            writeln!(f, "The following coupon has been marked as used.")?;
            writeln!(f, "Product:  {}", result.target_product)?;
            writeln!(f, "Discount: {}", result.discount)?;
            for action in &result.actions {
                let key = match action {
                    ResultAction::Continue | ResultAction::Next => "c",
                    ResultAction::End => "e",
                };
                writeln!(f, "  [{}] {}", key, action.label())?;
            }
            return Ok(());
        }

        if self.title_visible {
            writeln!(f, "=== Coupon verification ===")?;
        }
        if self.camera_area_visible {
            if self.camera.frame_visible {
                writeln!(f, "Camera: scanning (Ctrl-C to close)")?;
            } else if self.camera.start_visible {
                writeln!(f, "Camera: [s] start scanning")?;
            }
            if let Some(error) = &self.qr_error {
                writeln!(f, "  QR error: {}", error)?;
            }
        }
        if self.manual_area_visible {
            writeln!(f, "Manual:  [m <code>] verify a coupon code")?;
            if let Some(error) = &self.manual_error {
                writeln!(f, "  Code error: {}", error)?;
            }
        }
        Ok(())
    }
}
