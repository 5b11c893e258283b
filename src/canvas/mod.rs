pub mod backend;

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::actions::action_hints;
use crate::app::ViewState;
use crate::app::columns::{ColumnKind, format_cell};
use crate::collection::classify::Backends;
use crate::stats::DisplayRow;
use crate::utils::{base_name, truncate_to_width};
use crate::widgets::{glyphs_to_string, prepare_view};

/// Header title, highlighted when its column is the sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub text: String,
    pub active: bool,
}

/// One table line, already padded and clipped to the terminal width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLine {
    /// Fixed width columns, each followed by a separator space.
    pub cells: String,
    /// Tree connectors in front of the name, empty in list view.
    pub tree: String,
    pub name: String,
    pub selected: bool,
}

/// Everything needed to paint one frame, independent of the terminal backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    pub width: u16,
    pub height: u16,
    pub header: Vec<HeaderCell>,
    pub lines: Vec<ScreenLine>,
    pub status: String,
}

pub struct Canvas;

impl Canvas {
    /// Sort, filter and window `rows` for a `width` x `height` terminal.
    ///
    /// Re-syncs the selection and scroll offset held in `view`.
    pub fn layout(
        rows: &[DisplayRow],
        view: &mut ViewState,
        backends: &Backends,
        width: u16,
        height: u16,
    ) -> Screen {
        let mut sorted: Vec<&DisplayRow> = rows.iter().collect();
        sorted.sort_by(|a, b| {
            let order = view.sort_by.compare(a, b);
            if view.sort_asc { order } else { order.reverse() }
        });

        let prepared = prepare_view(sorted, view.tree, &view.type_filter, &view.fold);
        view.sync_selection(&prepared);

        // title + status lines
        let list_height = (height as usize).saturating_sub(2);
        view.update_offset(prepared.len(), list_height);

        let width_chars = width as usize;
        let lines = prepared
            .iter()
            .enumerate()
            .skip(view.offset)
            .take(list_height)
            .map(|(index, line)| {
                let cells = Self::row_cells(&view.columns, line.row, width_chars);
                let mut remaining = width_chars.saturating_sub(cells.chars().count());

                let (tree, name) = if view.tree {
                    let name = match base_name(&line.row.cgroup) {
                        "" => "[root]",
                        name => name,
                    };
                    (glyphs_to_string(&line.glyphs), name.to_string())
                } else {
                    (String::new(), line.row.cgroup.clone())
                };
                let tree = truncate_to_width(&tree, remaining);
                remaining = remaining.saturating_sub(tree.chars().count());

                ScreenLine {
                    cells,
                    tree,
                    name: truncate_to_width(&name, remaining),
                    selected: index == view.selected_index,
                }
            })
            .collect();

        Screen {
            width,
            height,
            header: Self::header(view, width_chars),
            lines,
            status: truncate_to_width(&Self::status(view, backends), width_chars),
        }
    }

    fn header(view: &ViewState, width: usize) -> Vec<HeaderCell> {
        let mut cells = Vec::new();
        let mut x = 0;

        for col in &view.columns {
            if x >= width {
                break;
            }
            let remaining = width - x;
            let col_width = col.width().unwrap_or(remaining).min(remaining);
            let mut text = format_cell(col.title(), col_width, col.align());
            if col_width < remaining {
                text.push(' ');
            }
            x += text.chars().count();
            cells.push(HeaderCell {
                text,
                active: col.sort_key() == view.sort_by,
            });
        }
        cells
    }

    fn row_cells(columns: &[ColumnKind], row: &DisplayRow, width: usize) -> String {
        let mut text = String::new();
        for col in columns {
            let Some(col_width) = col.width() else {
                continue;
            };
            text.push_str(&format_cell(&col.value(row), col_width, col.cell_align()));
            text.push(' ');
        }
        truncate_to_width(&text, width)
    }

    fn status(view: &ViewState, backends: &Backends) -> String {
        let on_off = |flag: bool| if flag { "On " } else { "Off " };

        let mut status = format!(
            " CTOP │ [P]ause: {}│ [F]ollow: {}│ [F5] Toggle {} view │",
            on_off(view.paused),
            on_off(view.follow),
            if view.tree { "list" } else { "tree" },
        );

        if view.tree {
            let folded = view
                .selected
                .as_ref()
                .is_some_and(|s| view.is_folded(&s.cgroup));
            status.push_str(if folded { " [+/-] unfold │" } else { " [+/-] fold │" });
        }

        if let Some(hints) = view
            .selected
            .as_ref()
            .and_then(|s| action_hints(s.kind, backends))
        {
            status.push_str(&format!(" {} │", hints));
        }

        status.push_str(" [Q]uit");
        status
    }

    pub fn draw(f: &mut Frame, screen: &Screen) {
        let area = f.area();
        if area.height == 0 || area.width == 0 {
            return;
        }

        let header_style = Style::default().fg(Color::Black).bg(Color::Green);
        let focus_style = Style::default().fg(Color::Black).bg(Color::Cyan);
        let tree_style = Style::default().fg(Color::Cyan);

        let header = Line::from(
            screen
                .header
                .iter()
                .map(|cell| {
                    let style = if cell.active { focus_style } else { header_style };
                    Span::styled(cell.text.clone(), style)
                })
                .collect::<Vec<_>>(),
        );
        f.render_widget(
            Paragraph::new(header).style(header_style),
            Rect::new(area.x, area.y, area.width, 1),
        );

        if area.height > 1 {
            let lines: Vec<Line> = screen
                .lines
                .iter()
                .map(|line| {
                    if line.selected {
                        Line::from(vec![
                            Span::raw(line.cells.clone()),
                            Span::raw(line.tree.clone()),
                            Span::raw(line.name.clone()),
                        ])
                        .style(focus_style)
                    } else {
                        Line::from(vec![
                            Span::raw(line.cells.clone()),
                            Span::styled(line.tree.clone(), tree_style),
                            Span::raw(line.name.clone()),
                        ])
                    }
                })
                .collect();
            let list_area = Rect::new(area.x, area.y + 1, area.width, area.height.saturating_sub(2));
            f.render_widget(Paragraph::new(lines), list_area);
        }

        if area.height > 2 {
            let status_area = Rect::new(area.x, area.y + area.height - 1, area.width, 1);
            f.render_widget(
                Paragraph::new(screen.status.clone()).style(focus_style),
                status_area,
            );
        }
    }
}
