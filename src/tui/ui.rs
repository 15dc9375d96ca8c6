//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::periph::{DecodeEvent, Phase};
use crate::signal::{Edge, SyncedSignal};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_events(frame, left_chunks[0], app);
    draw_decoder(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(9),
            Constraint::Length(6),
        ])
        .split(chunks[1]);

    draw_registers(frame, right_chunks[0], app);
    draw_help(frame, right_chunks[1], app);
}

/// Most recent decoder events, newest at the bottom.
fn draw_events(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let skip = app.log.len().saturating_sub(visible);

    let items: Vec<ListItem> = app.log
        .iter()
        .skip(skip)
        .map(|(tick, event)| {
            let style = match event {
                DecodeEvent::Dispatched(_) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                DecodeEvent::Rejected(_) => Style::default().fg(Color::Red),
                DecodeEvent::Reset => Style::default().fg(Color::Yellow),
                DecodeEvent::TransactionStarted => Style::default().fg(Color::Cyan),
                DecodeEvent::BitSampled { .. } => Style::default().fg(Color::DarkGray),
            };
            ListItem::new(format!("{:>8}  {}", tick, event)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Events ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Synchronizer histories, framer phase and the frame being assembled.
fn draw_decoder(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let sync = app.periph.sync();
    let txn = app.periph.transaction();
    let pins = app.next_pins();

    let phase_style = match app.periph.phase() {
        Phase::Active => Style::default().fg(Color::Green),
        Phase::Idle => Style::default().fg(Color::DarkGray),
    };

    // Collected bits in white, empty slots dimmed.
    let mut frame_spans = vec![Span::raw("Frame: ")];
    let count = txn.bit_count() as u32;
    for i in 0..16u32 {
        if i < count {
            let bit = (txn.shift_buffer() >> (count - 1 - i)) & 1;
            frame_spans.push(Span::styled(bit.to_string(), Style::default().fg(Color::White)));
        } else {
            frame_spans.push(Span::styled("·", Style::default().fg(Color::DarkGray)));
        }
        if i == 0 || i == 7 {
            frame_spans.push(Span::raw(" "));
        }
    }
    frame_spans.push(Span::raw(format!("  ({}/16)", count)));

    let content = vec![
        Line::from(vec![
            Span::raw("Phase: "),
            Span::styled(format!("{:?}", app.periph.phase()), phase_style),
            Span::raw(format!("   Tick: {}  of {}", app.pos, app.session.steps().len())),
        ]),
        Line::from(frame_spans),
        Line::from(vec![
            Span::raw("Sync:  nCS "),
            Span::styled(format!("{:?}", sync.select), history_style(sync.select)),
            Span::raw("  SCLK "),
            Span::styled(format!("{:?}", sync.clock), history_style(sync.clock)),
            Span::raw("  COPI "),
            Span::styled(format!("{:?}", sync.data), history_style(sync.data)),
        ]),
        Line::from(match pins {
            Some(p) => format!(
                "Next:  nCS={} SCLK={} COPI={} RST={}",
                p.select as u8, p.clock as u8, p.data as u8, p.reset as u8
            ),
            None => "Next:  (end of script)".to_string(),
        }),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Decoder ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let items: Vec<ListItem> = app.periph.registers()
        .iter()
        .map(|(reg, value)| {
            let text = format!(
                "{} 0x{:02X}  {:08b}  {}",
                reg.label(), value, value, reg.name()
            );
            let style = if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(format!(" Registers ({} writes) ", app.periph.writes()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  n: Next event  r: Run  p: Pause"),
        Line::from(format!(
            "b: Break on write [{}]  x: Reset  q: Quit",
            if app.break_on_write { "on" } else { "off" }
        )),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Highlight histories that currently show an edge.
fn history_style(signal: SyncedSignal) -> Style {
    match signal.edge() {
        Edge::Rising => Style::default().fg(Color::Green),
        Edge::Falling => Style::default().fg(Color::Red),
        Edge::Stable => Style::default().fg(Color::Gray),
    }
}
