use std::sync::mpsc::{self, Receiver};

use eframe::{App, egui};
use egui::{Color32, Key, RichText};

use crate::config::Config;
use crate::hotkey::{HotKeyRegistration, setup_hotkey_listener};
use crate::icons::IconCache;
use crate::launch;
use crate::models::{AppMessage, Menu, MenuItem};
use crate::nav::{Activation, Navigator};

pub const MENU_WIDTH: f32 = 340.0;
const MENU_MIN_HEIGHT: f32 = 120.0;
const MENU_MAX_HEIGHT: f32 = 560.0;
const SHELL_MARGIN: f32 = 10.0;
const HEADER_HEIGHT: f32 = 34.0;
const ERROR_HEIGHT: f32 = 26.0;
const ROW_PADDING_Y: f32 = 5.0;
const ROW_SPACING: f32 = 2.0;
const SEPARATOR_HEIGHT: f32 = 9.0;
const LABEL_MIN_HEIGHT: f32 = 20.0;

/// The popup: one menu level at a time, drilled into with the keyboard or
/// the mouse.
pub struct MenuPopup {
    root: Menu,
    nav: Navigator,
    icons: IconCache,
    last_error: Option<String>,
    visible: bool,
    was_focused: bool,
    resident: bool,
    hotkey_rx: Receiver<AppMessage>,
    _hotkey: Option<HotKeyRegistration>,
    last_size: Option<[f32; 2]>,
}

impl MenuPopup {
    pub fn new(ctx: &egui::Context, root: Menu, config: &Config, hotkey: Option<&str>) -> Self {
        let (hotkey_rx, registration) = match hotkey {
            Some(combo) => setup_hotkey_listener(ctx, combo),
            None => {
                let (_tx, rx) = mpsc::channel();
                (rx, None)
            }
        };
        let resident = registration.is_some();
        if hotkey.is_some() && !resident {
            log::warn!("falling back to a one-shot popup");
            ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }

        Self {
            nav: Navigator::new(&root),
            root,
            icons: IconCache::new(config.icon_size, config.icon_theme.clone()),
            last_error: None,
            visible: !resident,
            was_focused: false,
            resident,
            hotkey_rx,
            _hotkey: registration,
            last_size: None,
        }
    }

    fn process_app_messages(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.hotkey_rx.try_recv() {
            match msg {
                AppMessage::ToggleMenu => {
                    if self.visible {
                        self.hide_menu(ctx);
                    } else {
                        self.show_menu(ctx);
                    }
                }
            }
        }
    }

    fn show_menu(&mut self, ctx: &egui::Context) {
        self.visible = true;
        self.was_focused = false;
        self.last_error = None;
        self.last_size = None;
        self.nav.reset(&self.root);
        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
        ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
    }

    fn hide_menu(&mut self, ctx: &egui::Context) {
        self.visible = false;
        self.was_focused = false;
        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(false));
    }

    /// Escape, focus loss and a successful launch all end up here.
    fn dismiss(&mut self, ctx: &egui::Context) {
        if self.resident {
            self.hide_menu(ctx);
        } else {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn row_height(&self) -> f32 {
        self.icons.size().max(LABEL_MIN_HEIGHT) + ROW_PADDING_Y * 2.0
    }

    fn sync_menu_size(&mut self, ctx: &egui::Context) {
        if !self.visible {
            return;
        }

        let items = &self.nav.current(&self.root).items;
        let target = [
            MENU_WIDTH,
            desired_height(items, self.row_height(), self.last_error.is_some()),
        ];
        let needs_resize = self.last_size.is_none_or(|last| {
            (last[0] - target[0]).abs() > f32::EPSILON || (last[1] - target[1]).abs() > f32::EPSILON
        });

        if needs_resize {
            ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(
                target[0], target[1],
            )));
            self.last_size = Some(target);
        }
    }

    fn activate_selected(&mut self, ctx: &egui::Context) {
        let result = match self.nav.activate(&self.root) {
            Activation::Opened => {
                self.last_error = None;
                return;
            }
            Activation::Launch(entry) => launch::launch(entry),
            Activation::Nothing => return,
        };

        match result {
            Ok(()) => self.dismiss(ctx),
            Err(err) => {
                log::error!("{err}");
                self.last_error = Some(err.to_string());
            }
        }
    }

    fn go_back(&mut self) {
        if self.nav.back() {
            self.last_error = None;
        }
    }

    /// Focus is only tracked once the window actually had it, so a popup
    /// still waiting for the compositor is not closed prematurely.
    fn lost_focus(&mut self, ctx: &egui::Context) -> bool {
        match ctx.input(|i| i.viewport().focused) {
            Some(true) => {
                self.was_focused = true;
                false
            }
            Some(false) => self.was_focused,
            None => false,
        }
    }

    fn apply_theme(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::light();
        visuals.panel_fill = Color32::from_rgb(240, 240, 240);
        visuals.window_fill = Color32::from_rgb(245, 245, 245);
        visuals.override_text_color = Some(Color32::from_rgb(25, 25, 25));
        visuals.selection.bg_fill = Color32::from_rgb(209, 238, 250);
        visuals.selection.stroke = egui::Stroke::new(1.0, Color32::from_rgb(82, 164, 203));
        ctx.set_visuals(visuals);

        let mut style = (*ctx.style()).clone();
        style
            .text_styles
            .insert(egui::TextStyle::Heading, egui::FontId::proportional(17.0));
        style
            .text_styles
            .insert(egui::TextStyle::Body, egui::FontId::proportional(15.0));
        style
            .text_styles
            .insert(egui::TextStyle::Small, egui::FontId::proportional(12.0));
        style.spacing.item_spacing = egui::vec2(8.0, ROW_SPACING);
        ctx.set_style(style);
    }

    fn render_header(&self, ui: &mut egui::Ui, go_back: &mut bool) {
        ui.horizontal(|ui| {
            ui.set_height(HEADER_HEIGHT - 8.0);
            if self.nav.depth() > 0 {
                let back = ui.add(
                    egui::Label::new(RichText::new("‹").size(20.0).color(Color32::from_gray(70)))
                        .sense(egui::Sense::click()),
                );
                if back.clicked() {
                    *go_back = true;
                }
            }
            let title = self.nav.breadcrumb(&self.root).join(" › ");
            ui.label(
                RichText::new(title)
                    .text_style(egui::TextStyle::Heading)
                    .strong()
                    .color(Color32::from_gray(20)),
            );
        });
        ui.separator();
    }
}

/// The popup window. A resident popup starts unmapped and is shown by the
/// hotkey.
pub fn viewport(resident: bool) -> egui::ViewportBuilder {
    egui::ViewportBuilder::default()
        .with_inner_size([MENU_WIDTH, 420.0])
        .with_resizable(false)
        .with_transparent(true)
        .with_decorations(false)
        .with_always_on_top()
        .with_visible(!resident)
        .with_app_id("somenu")
        .with_title("somenu")
}

/// Window height needed to show `items` without scrolling, clamped.
fn desired_height(items: &[MenuItem], row_height: f32, has_error: bool) -> f32 {
    let rows: f32 = items
        .iter()
        .map(|item| {
            if item.is_separator() {
                SEPARATOR_HEIGHT
            } else {
                row_height + ROW_SPACING
            }
        })
        .sum();
    let rows = if items.is_empty() { row_height } else { rows };
    let error = if has_error { ERROR_HEIGHT } else { 0.0 };

    (SHELL_MARGIN * 4.0 + HEADER_HEIGHT + rows + error).clamp(MENU_MIN_HEIGHT, MENU_MAX_HEIGHT)
}

impl App for MenuPopup {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        egui::Rgba::from_rgba_unmultiplied(0.0, 0.0, 0.0, 0.0).to_array()
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_app_messages(ctx);
        if !self.visible {
            return;
        }
        if self.lost_focus(ctx) {
            log::debug!("focus lost, dismissing");
            self.dismiss(ctx);
            return;
        }
        self.apply_theme(ctx);

        let mut activate = false;
        let mut go_back = false;
        let mut dismiss = false;
        let mut selection_moved = false;

        ctx.input(|input| {
            if input.key_pressed(Key::Escape) {
                dismiss = true;
            }
            if input.key_pressed(Key::ArrowUp) {
                self.nav.move_up(&self.root);
                selection_moved = true;
            }
            if input.key_pressed(Key::ArrowDown) {
                self.nav.move_down(&self.root);
                selection_moved = true;
            }
            if input.key_pressed(Key::Enter) || input.key_pressed(Key::ArrowRight) {
                activate = true;
            }
            if input.key_pressed(Key::ArrowLeft) || input.key_pressed(Key::Backspace) {
                go_back = true;
            }
        });

        let row_height = self.row_height();
        let icon_size = self.icons.size();
        let mut hovered: Option<usize> = None;
        let mut clicked: Option<usize> = None;

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::TRANSPARENT))
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(Color32::from_rgba_unmultiplied(250, 250, 250, 252))
                    .rounding(egui::Rounding::same(12.0))
                    .stroke(egui::Stroke::new(1.0, Color32::from_rgba_unmultiplied(0, 0, 0, 35)))
                    .inner_margin(egui::Margin::same(SHELL_MARGIN))
                    .show(ui, |ui| {
                        ui.set_width(ui.available_width());
                        self.render_header(ui, &mut go_back);

                        if let Some(err) = &self.last_error {
                            ui.colored_label(Color32::RED, format!("Error: {err}"));
                        }

                        let menu = self.nav.current(&self.root);
                        let selected = self.nav.selected();
                        if menu.items.is_empty() {
                            ui.label(
                                RichText::new("No applications")
                                    .italics()
                                    .color(Color32::from_gray(95)),
                            );
                            return;
                        }

                        egui::ScrollArea::vertical()
                            .auto_shrink([false, true])
                            .show(ui, |ui| {
                                for (idx, item) in menu.items.iter().enumerate() {
                                    if item.is_separator() {
                                        ui.separator();
                                        continue;
                                    }

                                    let is_sel = selected == Some(idx);
                                    let bg = if is_sel {
                                        Color32::from_rgb(230, 236, 245)
                                    } else {
                                        Color32::TRANSPARENT
                                    };
                                    let texture = self.icons.get(ctx, item.icon());

                                    let row = egui::Frame::none()
                                        .fill(bg)
                                        .rounding(egui::Rounding::same(6.0))
                                        .inner_margin(egui::Margin::symmetric(8.0, ROW_PADDING_Y))
                                        .show(ui, |ui| {
                                            ui.set_width(ui.available_width());
                                            ui.set_height(row_height - ROW_PADDING_Y * 2.0);
                                            ui.horizontal_centered(|ui| {
                                                ui.add(
                                                    egui::Image::new(&texture)
                                                        .fit_to_exact_size(egui::vec2(icon_size, icon_size)),
                                                );
                                                ui.label(RichText::new(item.label()).color(if is_sel {
                                                    Color32::from_gray(20)
                                                } else {
                                                    Color32::from_gray(35)
                                                }));
                                                if matches!(item, MenuItem::Submenu(_)) {
                                                    ui.with_layout(
                                                        egui::Layout::right_to_left(egui::Align::Center),
                                                        |ui| {
                                                            ui.label(
                                                                RichText::new("›")
                                                                    .size(18.0)
                                                                    .color(Color32::from_gray(95)),
                                                            )
                                                        },
                                                    );
                                                }
                                            });
                                        })
                                        .response
                                        .interact(egui::Sense::click());
                                    let row = match item.tooltip() {
                                        Some(tooltip) => row.on_hover_text(tooltip),
                                        None => row,
                                    };

                                    if row.hovered() && ui.input(|i| i.pointer.is_moving()) {
                                        hovered = Some(idx);
                                    }
                                    if selection_moved && is_sel {
                                        ui.scroll_to_rect(row.rect, Some(egui::Align::Center));
                                    }
                                    if row.clicked() {
                                        clicked = Some(idx);
                                    }
                                }
                            });
                    });
            });

        if let Some(idx) = hovered {
            self.nav.select(&self.root, idx);
        }
        if let Some(idx) = clicked {
            self.nav.select(&self.root, idx);
            activate = true;
        }

        if dismiss {
            self.dismiss(ctx);
            return;
        }
        if go_back {
            self.go_back();
        }
        if activate {
            self.activate_selected(ctx);
        }
        self.sync_menu_size(ctx);
    }
}
