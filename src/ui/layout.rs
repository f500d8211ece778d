use crate::app::App;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};
use speedprobe::speedtest::{TestPhase, TestSnapshot, TestStatus};

const ACCENT: Color = Color::Rgb(100, 149, 237);
const SUCCESS: Color = Color::Rgb(134, 194, 156);
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220);
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let snapshot = app.engine.snapshot();
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(6),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], &snapshot);

    let panels = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(chunks[1]);

    draw_ping_panel(frame, panels[0], &snapshot);
    draw_speed_panel(frame, panels[1], &snapshot, TestPhase::Download);
    draw_speed_panel(frame, panels[2], &snapshot, TestPhase::Upload);

    draw_live_graph(frame, chunks[2], &snapshot);
    draw_help(frame, chunks[3], &snapshot);
}

fn draw_header(frame: &mut Frame, area: Rect, snapshot: &TestSnapshot) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    let title = Paragraph::new("speedprobe")
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD));
    frame.render_widget(title, chunks[0]);

    let (status, color) = match (snapshot.status, snapshot.phase) {
        (TestStatus::Idle, _) => ("Ready", TEXT_MUTED),
        (TestStatus::Completed, _) => ("Complete", ACCENT),
        (TestStatus::Testing, TestPhase::Ping) => ("Measuring latency...", WARN),
        (TestStatus::Testing, TestPhase::Download) => ("Testing download...", SUCCESS),
        (TestStatus::Testing, TestPhase::Upload) => ("Testing upload...", INFO),
        (TestStatus::Testing, TestPhase::Done) => ("Finishing...", ACCENT),
    };

    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new(phase_line(snapshot)).alignment(Alignment::Right),
        chunks[2],
    );
}

fn phase_line(snapshot: &TestSnapshot) -> Line<'static> {
    let phases = [
        (TestPhase::Ping, "ping"),
        (TestPhase::Download, "down"),
        (TestPhase::Upload, "up"),
    ];

    let mut spans = Vec::new();
    for (i, (phase, label)) in phases.iter().enumerate() {
        let style = if snapshot.status == TestStatus::Testing && snapshot.phase == *phase {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if snapshot.status != TestStatus::Idle && snapshot.phase > *phase {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };
        spans.push(Span::styled(*label, style));

        if i < phases.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn draw_ping_panel(frame: &mut Frame, area: Rect, snapshot: &TestSnapshot) {
    let block = panel_block("Latency", WARN, snapshot.phase == TestPhase::Ping);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([Constraint::Length(2), Constraint::Length(1)]).split(inner);

    let measured = snapshot.status != TestStatus::Idle && snapshot.phase > TestPhase::Ping;
    let value = if measured {
        format!("{:.0} ms", snapshot.results.ping_ms)
    } else {
        "—".to_string()
    };
    frame.render_widget(
        Paragraph::new(value)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let jitter = if measured {
        format!("jitter {:.2} ms", snapshot.results.jitter_ms)
    } else {
        "jitter —".to_string()
    };
    frame.render_widget(
        Paragraph::new(jitter)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[1],
    );
}

fn draw_speed_panel(frame: &mut Frame, area: Rect, snapshot: &TestSnapshot, phase: TestPhase) {
    let (title, color, dim_color, final_value) = match phase {
        TestPhase::Download => ("Download", SUCCESS, SUCCESS_DIM, snapshot.results.download_mbps),
        _ => ("Upload", INFO, INFO_DIM, snapshot.results.upload_mbps),
    };
    let active = snapshot.status == TestStatus::Testing && snapshot.phase == phase;

    let block = panel_block(title, color, active);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([Constraint::Length(2), Constraint::Length(1)]).split(inner);

    let speed = if active {
        snapshot.current_speed
    } else if snapshot.status != TestStatus::Idle && snapshot.phase > phase {
        final_value
    } else {
        0.0
    };
    frame.render_widget(
        Paragraph::new(format_speed(speed))
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let progress = if active {
        snapshot.progress / 100.0
    } else if snapshot.status != TestStatus::Idle && snapshot.phase > phase {
        1.0
    } else {
        0.0
    };
    draw_progress_bar(frame, chunks[1], progress, color, dim_color);
}

fn panel_block(title: &str, color: Color, active: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if active { color } else { TEXT_SECONDARY }),
        ))
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_live_graph(frame: &mut Frame, area: Rect, snapshot: &TestSnapshot) {
    let color = match snapshot.phase {
        TestPhase::Upload => INFO,
        _ => SUCCESS,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(
            format!(" {} ", format_speed(snapshot.current_speed)),
            Style::default().fg(TEXT_SECONDARY),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let data = &snapshot.sample_history;
    if data.is_empty() || inner.width < 4 || inner.height < 2 {
        return;
    }

    let max_val = data.iter().cloned().fold(0.0, f64::max).max(1.0);
    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len().max(2) as f64 - 1.0]))
        .y_axis(Axis::default().bounds([0.0, max_val * 1.1]));

    frame.render_widget(chart, inner);
}

fn draw_help(frame: &mut Frame, area: Rect, snapshot: &TestSnapshot) {
    let help = match snapshot.status {
        TestStatus::Testing => "r reset · q quit",
        _ => "enter start · r reset · q quit",
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}
