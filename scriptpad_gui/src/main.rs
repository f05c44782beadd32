use eframe::{egui, App, Frame, NativeOptions};
use egui::text::LayoutJob;
use egui::{Color32, FontId, TextFormat, TextStyle};
use scriptpad_core::Document;
use scriptpad_highlight::{Color, KeywordSet, KeywordStyle};
use scriptpad_runexec::{default_interpreter, RunDispatcher, RunReport, RunRequest};
use std::time::Duration;

const APP_TITLE: &str = "ScriptPad";
const EDITOR_FONT_SIZE: f32 = 13.0;

/// Process-wide configuration, fixed after startup.
struct EditorConfig {
    interpreter: String,
    filter_label: &'static str,
    extension: &'static str,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter().to_string(),
            filter_label: "Python Files",
            extension: "py",
        }
    }
}

/// One read-only console window holding the captured output of a run.
struct OutputConsole {
    id: u64,
    title: String,
    body: String,
    open: bool,
}

impl OutputConsole {
    fn new(id: u64, report: &RunReport) -> Self {
        Self {
            id,
            title: format!("Output Console #{id}"),
            body: report.console_text(),
            open: true,
        }
    }
}

struct ScriptPadApp {
    document: Document,
    config: EditorConfig,
    keywords: &'static KeywordSet,
    keyword_style: KeywordStyle,
    dispatcher: RunDispatcher,
    consoles: Vec<OutputConsole>,
}

impl Default for ScriptPadApp {
    fn default() -> Self {
        Self {
            document: Document::new(),
            config: EditorConfig::default(),
            keywords: KeywordSet::python(),
            keyword_style: KeywordStyle::default(),
            dispatcher: RunDispatcher::new(),
            consoles: Vec::new(),
        }
    }
}

impl App for ScriptPadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_run_events();

        self.show_menu_bar(ctx);
        self.show_status_bar(ctx);
        self.show_editor(ctx);
        self.show_consoles(ctx);

        if self.dispatcher.pending() > 0 {
            // Poll again shortly so finished runs appear without user input.
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

impl ScriptPadApp {
    /// Collects finished runs from the dispatcher channel. Only this
    /// UI-thread method turns run results into widget state.
    fn drain_run_events(&mut self) {
        while let Some(event) = self.dispatcher.try_next() {
            match event.outcome {
                Ok(report) => {
                    self.consoles.push(OutputConsole::new(event.id, &report));
                }
                Err(err) => {
                    show_error_dialog("Run failed", &err.to_string());
                }
            }
        }
    }

    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("New").clicked() {
                        self.new_file();
                        ui.close_menu();
                    }
                    if ui.button("Open...").clicked() {
                        self.open_file();
                        ui.close_menu();
                    }
                    if ui.button("Save...").clicked() {
                        self.save_file();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Run", |ui| {
                    if ui.button("Run").clicked() {
                        self.run_script();
                        ui.close_menu();
                    }
                });
            });
        });
    }

    fn new_file(&mut self) {
        // Unsaved changes are discarded without confirmation.
        self.document = Document::new();
    }

    fn open_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter(self.config.filter_label, &[self.config.extension])
            .add_filter("All Files", &["*"])
            .pick_file()
        else {
            return;
        };
        match Document::open(&path) {
            Ok(document) => {
                tracing::info!(path = %path.display(), "opened file");
                self.document = document;
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "open failed");
                show_error_dialog("Open failed", &err.to_string());
            }
        }
    }

    fn save_file(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .add_filter(self.config.filter_label, &[self.config.extension]);
        dialog = match self.document.file_name() {
            Some(name) => dialog.set_file_name(name),
            None => dialog.set_file_name(format!("untitled.{}", self.config.extension)),
        };
        let Some(path) = dialog.save_file() else {
            return;
        };
        if let Err(err) = self.document.save_as(&path) {
            tracing::error!(path = %path.display(), error = %err, "save failed");
            show_error_dialog("Save failed", &err.to_string());
        } else {
            tracing::info!(path = %path.display(), "saved file");
        }
    }

    fn run_script(&mut self) {
        let request = RunRequest::new(&self.config.interpreter, self.document.contents());
        self.dispatcher.spawn(request);
    }

    fn show_editor(&mut self, ctx: &egui::Context) {
        let keywords = self.keywords;
        let plain_format = TextFormat {
            font_id: FontId::monospace(EDITOR_FONT_SIZE),
            color: ctx.style().visuals.text_color(),
            ..Default::default()
        };
        let keyword_format = TextFormat {
            font_id: FontId::monospace(EDITOR_FONT_SIZE),
            color: color32_from_color(self.keyword_style.foreground),
            ..Default::default()
        };

        egui::CentralPanel::default().show(ctx, |ui| {
            let mut layouter = |ui: &egui::Ui, text: &str, wrap_width: f32| {
                let mut job = keyword_layout(text, keywords, &plain_format, &keyword_format);
                job.wrap.max_width = wrap_width;
                ui.fonts(|fonts| fonts.layout_job(job))
            };
            egui::ScrollArea::vertical().show(ui, |ui| {
                let response = ui.add_sized(
                    ui.available_size(),
                    egui::TextEdit::multiline(self.document.contents_mut())
                        .font(TextStyle::Monospace)
                        .desired_width(f32::INFINITY)
                        .layouter(&mut layouter),
                );
                if response.changed() {
                    self.document.mark_dirty();
                }
            });
        });
    }

    fn show_consoles(&mut self, ctx: &egui::Context) {
        for console in &mut self.consoles {
            let mut open = console.open;
            egui::Window::new(&console.title)
                .id(egui::Id::new(("output_console", console.id)))
                .open(&mut open)
                .default_width(480.0)
                .default_height(260.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut console.body.as_str())
                                .font(TextStyle::Monospace)
                                .desired_width(f32::INFINITY),
                        );
                    });
                });
            console.open = open;
        }
        self.consoles.retain(|console| console.open);
    }

    fn show_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let name = self.document.file_name().unwrap_or("untitled");
                let dirty = if self.document.is_dirty() { " •" } else { "" };
                ui.label(format!("{name}{dirty}"));
                ui.separator();
                ui.label(format!("{} lines", self.document.line_count()));
                ui.separator();
                ui.label(self.document.encoding().name());
                ui.separator();
                ui.label(self.document.line_ending().label());
                if self.dispatcher.pending() > 0 {
                    ui.separator();
                    ui.label(format!("{} running", self.dispatcher.pending()));
                }
            });
        });
    }
}

/// Builds the editor layout, styling keyword spans and leaving the rest
/// of the text in the plain format.
fn keyword_layout(
    text: &str,
    keywords: &KeywordSet,
    plain: &TextFormat,
    keyword: &TextFormat,
) -> LayoutJob {
    let mut job = LayoutJob::default();
    let mut cursor = 0;
    for span in keywords.spans(text) {
        if span.range.start > cursor {
            job.append(&text[cursor..span.range.start], 0.0, plain.clone());
        }
        job.append(&text[span.range.clone()], 0.0, keyword.clone());
        cursor = span.range.end;
    }
    if cursor < text.len() {
        job.append(&text[cursor..], 0.0, plain.clone());
    }
    job
}

fn color32_from_color(color: Color) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a)
}

fn show_error_dialog(title: &str, text: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(text)
        .show();
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt::init();

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title(APP_TITLE),
        ..Default::default()
    };
    eframe::run_native(
        APP_TITLE,
        options,
        Box::new(|_cc| Box::<ScriptPadApp>::default()),
    )
}
