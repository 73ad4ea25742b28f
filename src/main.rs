#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use eframe::egui;
use egui_extras::{Size, StripBuilder};
use futures_util::future::{AbortHandle, Abortable};
use tracing_subscriber::EnvFilter;

mod api;
mod forms;
mod link;
mod sse;
mod ws;

use api::HttpMethod;
use link::{LinkState, StreamEvent};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Panel {
    Api,
    WebSocket,
    Events,
    Login,
    Upload,
}

/// Everything the worker threads report back to the frame loop.
enum AppEvent {
    Api(String),
    Ws(StreamEvent),
    Sse(StreamEvent),
    Login(String),
    Upload(String),
}

struct PanelApp {
    // API tester
    api_url: String,
    api_method: HttpMethod,
    api_body: String,
    api_result: String,
    api_loading: bool,
    api_abort: Option<AbortHandle>,

    // WebSocket echo
    ws_url: String,
    ws_input: String,
    ws_transcript: String,
    ws_state: LinkState,
    ws_outbound: Option<tokio::sync::mpsc::UnboundedSender<String>>,

    // SSE listener
    sse_url: String,
    sse_transcript: String,
    sse_state: LinkState,

    // Login and upload forms
    base_url: String,
    account: String,
    password: String,
    login_result: String,
    login_loading: bool,
    upload_file: Option<PathBuf>,
    upload_result: String,
    upload_loading: bool,

    active_panel: Panel,

    // Communication channel for the worker threads
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl Default for PanelApp {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            api_url: "http://localhost:9001/api/test".to_string(),
            api_method: HttpMethod::Get,
            api_body: r#"{
    "name": "wirepanel",
    "age": 18
}"#
            .to_string(),
            api_result: String::new(),
            api_loading: false,
            api_abort: None,
            ws_url: "ws://localhost:9001/ws".to_string(),
            ws_input: String::new(),
            ws_transcript: String::new(),
            ws_state: LinkState::Idle,
            ws_outbound: None,
            sse_url: "http://localhost:9001/es".to_string(),
            sse_transcript: String::new(),
            sse_state: LinkState::Idle,
            base_url: "http://localhost:9001".to_string(),
            account: String::new(),
            password: String::new(),
            login_result: String::new(),
            login_loading: false,
            upload_file: None,
            upload_result: String::new(),
            upload_loading: false,
            active_panel: Panel::Api,
            tx,
            rx,
        }
    }
}

impl PanelApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self::default()
    }

    fn name() -> &'static str {
        "wirepanel"
    }

    fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::Api(rendered) => {
                self.api_result = rendered;
                self.api_loading = false;
                self.api_abort = None;
            }
            AppEvent::Ws(event) => {
                self.ws_state = self.ws_state.apply(&event);
                match event {
                    StreamEvent::Opened => self.ws_transcript.push_str("connected...\n"),
                    StreamEvent::Message(data) => {
                        self.ws_transcript.push_str("message:");
                        self.ws_transcript.push_str(&data);
                        self.ws_transcript.push('\n');
                    }
                    StreamEvent::Error(err) => {
                        self.ws_transcript.push_str("error:");
                        self.ws_transcript.push_str(&err);
                        self.ws_transcript.push('\n');
                    }
                    StreamEvent::Closed => self.ws_outbound = None,
                }
            }
            AppEvent::Sse(event) => {
                self.sse_state = self.sse_state.apply(&event);
                if let StreamEvent::Message(data) = event {
                    self.sse_transcript.push_str(&data);
                    self.sse_transcript.push('\n');
                }
            }
            AppEvent::Login(rendered) => {
                self.login_result = rendered;
                self.login_loading = false;
            }
            AppEvent::Upload(rendered) => {
                self.upload_result = rendered;
                self.upload_loading = false;
            }
        }
    }

    fn send_api_request(&mut self, ctx: &egui::Context) {
        // An unparseable body field drops the whole request.
        let Some(request) = api::from_fields(&self.api_url, self.api_method, &self.api_body)
        else {
            return;
        };
        let prepared = api::prepare(request);

        self.api_loading = true;
        self.api_result = "Loading...".to_string();

        // Cancellation is wired to the request future, but nothing triggers
        // it; the handle just sits here until the response lands.
        let (abort, registration) = AbortHandle::new_pair();
        self.api_abort = Some(abort);

        let tx = self.tx.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("failed to create request runtime");
            let outcome = rt.block_on(async move {
                let client = reqwest::Client::new();
                match Abortable::new(api::execute(&client, prepared), registration).await {
                    Ok(outcome) => outcome,
                    Err(_aborted) => Err(api::ApiError::Aborted),
                }
            });
            let rendered = match outcome {
                Ok(body) => body,
                Err(err) => err.to_string(),
            };
            let _ = tx.send(AppEvent::Api(rendered));
            ctx.request_repaint();
        });
    }

    fn connect_ws(&mut self, ctx: &egui::Context) {
        self.ws_state = LinkState::Connecting;
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        let outbound = ws::spawn(self.ws_url.clone(), move |event| {
            let _ = tx.send(AppEvent::Ws(event));
            ctx.request_repaint();
        });
        self.ws_outbound = Some(outbound);
    }

    fn send_ws_message(&mut self) {
        let message = self.ws_input.trim().to_string();
        if message.is_empty() {
            return;
        }
        let Some(outbound) = &self.ws_outbound else {
            return;
        };
        if outbound.send(message).is_ok() {
            self.ws_input.clear();
        }
    }

    fn start_sse(&mut self, ctx: &egui::Context) {
        self.sse_state = LinkState::Connecting;
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        sse::spawn(self.sse_url.clone(), move |event| {
            let _ = tx.send(AppEvent::Sse(event));
            ctx.request_repaint();
        });
    }

    fn submit_login(&mut self, ctx: &egui::Context) {
        self.login_loading = true;
        self.login_result = "Loading...".to_string();
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        forms::spawn_login(
            self.base_url.clone(),
            self.account.clone(),
            self.password.clone(),
            move |rendered| {
                let _ = tx.send(AppEvent::Login(rendered));
                ctx.request_repaint();
            },
        );
    }

    fn submit_upload(&mut self, ctx: &egui::Context) {
        let Some(path) = self.upload_file.clone() else {
            self.upload_result = "please select a file to upload".to_string();
            return;
        };
        self.upload_loading = true;
        self.upload_result = "uploading...".to_string();
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        forms::spawn_upload(self.base_url.clone(), path, move |rendered| {
            let _ = tx.send(AppEvent::Upload(rendered));
            ctx.request_repaint();
        });
    }

    fn render_api_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.style_mut().spacing.interact_size.y = 30.0;

                egui::ComboBox::from_id_salt("api_method")
                    .selected_text(self.api_method.as_str())
                    .width(100.0)
                    .show_ui(ui, |ui| {
                        for method in HttpMethod::ALL {
                            ui.selectable_value(&mut self.api_method, method, method.as_str());
                        }
                    });

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    // Clicks are not debounced: overlapping requests race and
                    // the last one to settle owns the result panel.
                    let send_button =
                        ui.add(egui::Button::new("Send").min_size(egui::vec2(80.0, 30.0)));
                    let url_field = ui.add(
                        egui::TextEdit::singleline(&mut self.api_url)
                            .desired_width(f32::INFINITY)
                            .min_size(egui::vec2(0.0, 30.0))
                            .hint_text("http://localhost:9001/api/test")
                            .vertical_align(egui::Align::Center),
                    );
                    let submitted =
                        url_field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if (send_button.clicked() || submitted) && !self.api_url.is_empty() {
                        self.send_api_request(ctx);
                    }
                });
            });
        });

        ui.add_space(8.0);

        StripBuilder::new(ui)
            .size(Size::remainder())
            .size(Size::remainder())
            .horizontal(|mut strip| {
                strip.cell(|ui| {
                    framed(ui, |ui| {
                        ui.strong("Body");
                        ui.add_space(6.0);
                        ui.label("Sent as JSON for POST and PUT, as query parameters otherwise.");
                        ui.add_space(4.0);
                        egui::ScrollArea::vertical()
                            .id_salt("api_body_scroll")
                            .show(ui, |ui| {
                                let line_height =
                                    ui.text_style_height(&egui::TextStyle::Monospace);
                                let rows = (ui.available_height() / line_height).max(1.0) as usize;
                                ui.expand_to_include_rect(ui.max_rect());
                                egui::TextEdit::multiline(&mut self.api_body)
                                    .code_editor()
                                    .desired_width(f32::INFINITY)
                                    .desired_rows(rows)
                                    .show(ui);
                            });
                    });
                });
                strip.cell(|ui| {
                    framed(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.strong("Result");
                            ui.with_layout(
                                egui::Layout::right_to_left(egui::Align::Center),
                                |ui| {
                                    if self.api_loading {
                                        ui.spinner();
                                    }
                                },
                            );
                        });
                        ui.add_space(6.0);
                        egui::ScrollArea::vertical()
                            .id_salt("api_result_scroll")
                            .show(ui, |ui| {
                                readonly_text(ui, &self.api_result);
                            });
                    });
                });
            });
    }

    fn render_ws_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.label("URL:");
                ui.add(egui::TextEdit::singleline(&mut self.ws_url).desired_width(320.0));
                let connect =
                    ui.add_enabled(!self.ws_state.is_active(), egui::Button::new("Connect"));
                if connect.clicked() && !self.ws_url.is_empty() {
                    self.connect_ws(ctx);
                }
                ui.label(self.ws_state.label());
            });
            ui.horizontal(|ui| {
                let send =
                    ui.add_enabled(self.ws_state == LinkState::Open, egui::Button::new("Send"));
                ui.add(
                    egui::TextEdit::singleline(&mut self.ws_input)
                        .desired_width(f32::INFINITY)
                        .hint_text("message"),
                );
                if send.clicked() {
                    self.send_ws_message();
                }
            });
        });

        ui.add_space(8.0);

        framed(ui, |ui| {
            ui.strong("Messages");
            ui.add_space(6.0);
            egui::ScrollArea::vertical()
                .id_salt("ws_transcript_scroll")
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    readonly_text(ui, &self.ws_transcript);
                });
        });
    }

    fn render_events_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.label("URL:");
                ui.add(egui::TextEdit::singleline(&mut self.sse_url).desired_width(320.0));
                // Disabled while a stream is up, back on when it dies.
                let listen =
                    ui.add_enabled(!self.sse_state.is_active(), egui::Button::new("Listen"));
                if listen.clicked() && !self.sse_url.is_empty() {
                    self.start_sse(ctx);
                }
                ui.label(self.sse_state.label());
            });
        });

        ui.add_space(8.0);

        framed(ui, |ui| {
            ui.strong("Events");
            ui.add_space(6.0);
            egui::ScrollArea::vertical()
                .id_salt("sse_transcript_scroll")
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    readonly_text(ui, &self.sse_transcript);
                });
        });
    }

    fn render_login_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.label("Server:");
                ui.add(egui::TextEdit::singleline(&mut self.base_url).desired_width(320.0));
            });
            ui.horizontal(|ui| {
                ui.label("Account:");
                ui.add(egui::TextEdit::singleline(&mut self.account).desired_width(200.0));
            });
            ui.horizontal(|ui| {
                ui.label("Password:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.password)
                        .password(true)
                        .desired_width(200.0),
                );
            });
            ui.horizontal(|ui| {
                let login = ui.button("Login");
                if login.clicked() {
                    self.submit_login(ctx);
                }
                if self.login_loading {
                    ui.spinner();
                }
            });
        });

        ui.add_space(8.0);

        framed(ui, |ui| {
            ui.strong("Result");
            ui.add_space(6.0);
            egui::ScrollArea::vertical()
                .id_salt("login_result_scroll")
                .show(ui, |ui| {
                    readonly_text(ui, &self.login_result);
                });
        });
    }

    fn render_upload_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.label("Server:");
                ui.add(egui::TextEdit::singleline(&mut self.base_url).desired_width(320.0));
            });
            ui.horizontal(|ui| {
                if ui.button("Choose file").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_file() {
                        self.upload_file = Some(path);
                    }
                }
                match &self.upload_file {
                    Some(path) => {
                        ui.label(
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .unwrap_or("file"),
                        );
                    }
                    None => {
                        ui.label("no file selected");
                    }
                }
                let upload = ui.button("Upload");
                if upload.clicked() {
                    self.submit_upload(ctx);
                }
                if self.upload_loading {
                    ui.spinner();
                }
            });
        });

        ui.add_space(8.0);

        framed(ui, |ui| {
            ui.strong("Result");
            ui.add_space(6.0);
            egui::ScrollArea::vertical()
                .id_salt("upload_result_scroll")
                .show(ui, |ui| {
                    readonly_text(ui, &self.upload_result);
                });
        });
    }
}

impl eframe::App for PanelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Drain whatever the workers sent since the last frame.
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(Self::name());
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.active_panel, Panel::Api, "API");
                ui.selectable_value(&mut self.active_panel, Panel::WebSocket, "WebSocket");
                ui.selectable_value(&mut self.active_panel, Panel::Events, "Events");
                ui.selectable_value(&mut self.active_panel, Panel::Login, "Login");
                ui.selectable_value(&mut self.active_panel, Panel::Upload, "Upload");
            });
            ui.separator();
            ui.add_space(4.0);

            match self.active_panel {
                Panel::Api => self.render_api_panel(ui, ctx),
                Panel::WebSocket => self.render_ws_panel(ui, ctx),
                Panel::Events => self.render_events_panel(ui, ctx),
                Panel::Login => self.render_login_panel(ui, ctx),
                Panel::Upload => self.render_upload_panel(ui, ctx),
            }
        });

        // Keep repainting while a one-shot request is in flight.
        if self.api_loading || self.login_loading || self.upload_loading {
            ctx.request_repaint();
        }
    }
}

fn framed(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::NONE
        .stroke(egui::Stroke::new(1.0, egui::Color32::from_gray(60)))
        .inner_margin(egui::Margin::same(10))
        .show(ui, |ui| {
            ui.expand_to_include_rect(ui.max_rect());
            add_contents(ui);
        });
}

fn readonly_text(ui: &mut egui::Ui, mut text: &str) {
    let line_height = ui.text_style_height(&egui::TextStyle::Monospace);
    let rows = (ui.available_height() / line_height).max(1.0) as usize;
    ui.expand_to_include_rect(ui.max_rect());
    ui.add(
        egui::TextEdit::multiline(&mut text)
            .code_editor()
            .desired_width(f32::INFINITY)
            .desired_rows(rows),
    );
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size((1100.0, 720.0))
            .with_min_inner_size((400.0, 300.0)),
        ..eframe::NativeOptions::default()
    };

    eframe::run_native(
        PanelApp::name(),
        native_options,
        Box::new(|cc| Ok(Box::new(PanelApp::new(cc)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_result_overwrites_and_clears_loading() {
        let mut app = PanelApp::default();
        app.api_loading = true;
        app.api_result = "Loading...".to_string();
        app.apply(AppEvent::Api("bad".to_string()));
        assert_eq!(app.api_result, "bad");
        assert!(!app.api_loading);
        assert!(app.api_abort.is_none());
    }

    #[test]
    fn ws_events_drive_the_transcript_and_state() {
        let mut app = PanelApp::default();
        app.apply(AppEvent::Ws(StreamEvent::Opened));
        app.apply(AppEvent::Ws(StreamEvent::Message("pong".to_string())));
        assert_eq!(app.ws_transcript, "connected...\nmessage:pong\n");
        assert_eq!(app.ws_state, LinkState::Open);
        app.apply(AppEvent::Ws(StreamEvent::Closed));
        assert_eq!(app.ws_state, LinkState::Closed);
        assert!(app.ws_outbound.is_none());
    }

    #[test]
    fn sse_messages_append_one_line_each() {
        let mut app = PanelApp::default();
        app.apply(AppEvent::Sse(StreamEvent::Opened));
        app.apply(AppEvent::Sse(StreamEvent::Message("tick".to_string())));
        app.apply(AppEvent::Sse(StreamEvent::Message("tock".to_string())));
        assert_eq!(app.sse_transcript, "tick\ntock\n");
        app.apply(AppEvent::Sse(StreamEvent::Error("gone".to_string())));
        app.apply(AppEvent::Sse(StreamEvent::Closed));
        assert_eq!(app.sse_state, LinkState::Closed);
    }

    #[test]
    fn form_results_land_in_their_own_panels() {
        let mut app = PanelApp::default();
        app.login_loading = true;
        app.upload_loading = true;
        app.apply(AppEvent::Login("login failed".to_string()));
        app.apply(AppEvent::Upload("{\n    \"size\": 12\n}".to_string()));
        assert_eq!(app.login_result, "login failed");
        assert_eq!(app.upload_result, "{\n    \"size\": 12\n}");
        assert!(!app.login_loading);
        assert!(!app.upload_loading);
    }
}
