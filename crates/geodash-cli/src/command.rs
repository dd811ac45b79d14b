//! Line commands for the stdin driver.

use anyhow::{anyhow, bail, Context};
use geodash_core::Action;
use geodash_proto::{DateRange, LayerId, Month, Polygon};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Action(Action),
    /// Print the current view as JSON.
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  layer <id> [on|off|toggle]   switch a layer
  opacity <id> <0..1>          set layer opacity
  range <start> [end]          set the month range (YYYY-MM)
  draw                         toggle the drawing surface
  cancel                       cancel drawing
  rect <s> <w> <n> <e>         draw a rectangle
  polygon <geojson>            draw a GeoJSON polygon
  apply                        apply the drawn area
  clear                        clear the area of interest
  click <lat> <lng>            query pixel values
  dismiss                      close the pixel popup
  refresh                      re-issue the current query
  state                        print the view
  quit";

fn float(arg: Option<&str>, name: &str) -> anyhow::Result<f64> {
    let raw = arg.ok_or_else(|| anyhow!("missing {}", name))?;
    raw.parse::<f64>()
        .with_context(|| format!("bad {}: {:?}", name, raw))
}

fn layer(arg: Option<&str>) -> anyhow::Result<LayerId> {
    let raw = arg.ok_or_else(|| anyhow!("missing layer id"))?;
    Ok(raw.parse::<LayerId>()?)
}

/// Parse one input line.  Blank lines yield `None`.
pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((v, r)) => (v, r.trim()),
        None => (line, ""),
    };
    let mut args = rest.split_whitespace();

    let cmd = match verb {
        "" => return Ok(None),
        "layer" => {
            let layer = layer(args.next())?;
            let action = match args.next().unwrap_or("toggle") {
                "on" => Action::SetLayer {
                    layer,
                    enabled: true,
                },
                "off" => Action::SetLayer {
                    layer,
                    enabled: false,
                },
                "toggle" => Action::ToggleLayer(layer),
                other => bail!("expected on, off or toggle, got {:?}", other),
            };
            action.into()
        }
        "opacity" => {
            let layer = layer(args.next())?;
            let opacity = float(args.next(), "opacity")? as f32;
            Action::SetOpacity { layer, opacity }.into()
        }
        "range" => {
            let start: Month = args
                .next()
                .ok_or_else(|| anyhow!("missing start month"))?
                .parse()?;
            let range = match args.next() {
                Some(end) => DateRange::new(start, end.parse()?)?,
                None => DateRange::single(start),
            };
            Action::SetRange(range).into()
        }
        "draw" => Action::ToggleDrawing.into(),
        "cancel" => Action::CancelDrawing.into(),
        "rect" => {
            let s = float(args.next(), "south")?;
            let w = float(args.next(), "west")?;
            let n = float(args.next(), "north")?;
            let e = float(args.next(), "east")?;
            Action::GeometryDrawn(Polygon::rectangle(s, w, n, e)?).into()
        }
        "polygon" => Action::GeometryDrawn(Polygon::from_geojson(rest)?).into(),
        "apply" => Action::ApplyAoi.into(),
        "clear" => Action::ClearAoi.into(),
        "click" => {
            let lat = float(args.next(), "lat")?;
            let lng = float(args.next(), "lng")?;
            Action::MapClick { lat, lng }.into()
        }
        "dismiss" => Action::DismissPixel.into(),
        "refresh" => Action::Refresh.into(),
        "state" => Command::State,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command {:?} (try help)", other),
    };
    Ok(Some(cmd))
}

impl From<Action> for Command {
    fn from(action: Action) -> Self {
        Command::Action(action)
    }
}
