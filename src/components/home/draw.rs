use color_eyre::Result;
use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::{Modifier, Style, Stylize, palette::tailwind},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
};

use super::Home;
use crate::{
    layout::{CanvasSlot, LayoutSlot},
    shared::report::{ReportRow, today_report},
    sync::model::{DATE_FORMAT, ScanMode},
};

pub(super) fn draw(home: &mut Home, frame: &mut Frame, area: Rect) -> Result<()> {
    let area = render_frame(home, frame, area);

    let dashboard = crate::layout::canvas_vert(CanvasSlot::Dashboard, area);
    frame.render_widget(draw_dashboard(home), dashboard);

    let report_area = crate::layout::canvas_vert(CanvasSlot::Report, area);
    let rows = today_report(&home.state.projection);
    frame.render_stateful_widget(draw_report(&rows), report_area, &mut home.state.table);
    Ok(())
}

fn render_frame(home: &Home, frame: &mut Frame, area: Rect) -> Rect {
    let area = crate::layout::main_vert(LayoutSlot::MainCanvas, area);

    let title = match home.state.engine {
        Some(engine) => format!("🥣 {}", engine.today().format(DATE_FORMAT)),
        None => "🥣 not synced yet".to_owned(),
    };
    let block = Block::new()
        .borders(!Borders::BOTTOM)
        .border_type(BorderType::Rounded)
        .title(title);

    frame.render_widget(&block, area);
    block.inner(area)
}

fn draw_dashboard(home: &Home) -> Paragraph<'static> {
    let state = &home.state;
    let projection = &state.projection;

    let mode = match state.mode {
        ScanMode::Prep => " PREP ".on_green().black().bold(),
        ScanMode::Return => " RETURN ".on_blue().black().bold(),
    };
    let dish = match (state.mode, state.selected_dish(&home.config.dishes)) {
        (ScanMode::Prep, Some(dish)) => format!("Dish {dish}"),
        (ScanMode::Prep, None) => "No dishes configured".to_owned(),
        (ScanMode::Return, _) => String::new(),
    };
    let connection = if projection.connected {
        "● online".green()
    } else {
        "○ offline".red()
    };
    let user = &home.config.user;
    let header = Line::from(vec![
        mode,
        Span::from(format!("  {dish}  ")),
        Span::from(format!("{user} ({} today)  ", projection.tally_for(user))),
        connection,
    ]);

    let counters = Line::from(vec![
        "Active ".into(),
        projection.active_count.to_string().bold(),
        "   Prepared today ".into(),
        projection.prepared_today_count.to_string().bold(),
        "   Returned today ".into(),
        projection.returned_today_count.to_string().bold(),
    ]);
    let last_sync = Line::from(format!(
        "Customer data: {} bowls, last sync {}",
        projection.customers.len(),
        projection.last_sync.as_deref().unwrap_or("never")
    ))
    .dim();

    let prompt = format!("Scan ▶ {}", state.input);
    let input = if state.input_enabled {
        Line::from(vec![prompt.into(), "▏".slow_blink()])
    } else {
        Line::from(prompt).dim()
    };

    Paragraph::new(vec![header, counters, last_sync, Line::default(), input])
}

fn draw_report(rows: &[ReportRow]) -> Table<'static> {
    let header = TABLE_HEADERS
        .into_iter()
        .map(Cell::from)
        .collect::<Row>()
        .height(1)
        .bg(tailwind::INDIGO.c900);

    let body = rows.iter().enumerate().map(|(i, row)| {
        let cells = [
            row.company.clone(),
            row.dish.clone(),
            row.count.to_string(),
            row.customers.join(", "),
        ];
        zebra_stripe(i, Row::new(cells))
    });

    Table::new(body, TABLE_WIDTHS)
        .header(header)
        .row_highlight_style(Style::from(Modifier::REVERSED))
}

fn zebra_stripe(i: usize, row: Row) -> Row {
    let alternating_color = match i % 2 {
        0 => tailwind::SLATE.c800,
        _ => tailwind::SLATE.c900,
    };
    row.style(Style::new().bg(alternating_color))
}

const TABLE_WIDTHS: [Constraint; 4] = [
    Constraint::Max(24),
    Constraint::Length(5),
    Constraint::Length(6),
    Constraint::Fill(1),
];
const TABLE_HEADERS: [&str; 4] = ["Company", "Dish", "Bowls", "Customers"];
