use std::rc::Rc;

use leptos::prelude::*;

use worldmap_shared::{InfoContent, Playback, PlaybackCommand, WorldMap};

/// Offset of the info box from the pointer, in CSS pixels.
const INFO_OFFSET: f64 = 20.0;

/// Snapshot of the time controller for the control bar.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeView {
    pub current: usize,
    pub max: Option<usize>,
    pub paused: bool,
    pub speed: u32,
    pub date: Option<String>,
    pub has_series: bool,
}

impl TimeView {
    fn of(map: &WorldMap, playback: &Playback) -> Self {
        Self {
            current: playback.current(),
            max: playback.max(),
            paused: playback.is_paused(),
            speed: playback.speed(),
            date: map
                .time_series()
                .get(playback.current())
                .map(|frame| frame.date.clone()),
            has_series: !map.time_series().is_empty(),
        }
    }

    fn label(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| self.current.to_string())
    }
}

/// Reactive state shared by the overlay components.
#[derive(Clone, Copy)]
pub struct Overlay {
    pub info: RwSignal<Option<InfoContent>>,
    /// Pointer position in page viewport pixels.
    pub pointer: RwSignal<(f64, f64)>,
    pub time: RwSignal<Option<TimeView>>,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            info: RwSignal::new(None),
            pointer: RwSignal::new((0.0, 0.0)),
            time: RwSignal::new(None),
        }
    }
}

impl Overlay {
    /// Push the map's current overlay state into the signals, touching only
    /// what changed.
    pub fn sync(&self, map: &WorldMap) {
        let info = map.info().cloned();
        if self.info.with_untracked(|current| *current != info) {
            self.info.set(info);
        }
        let time = map
            .playback()
            .map(|playback| TimeView::of(map, playback));
        if self.time.with_untracked(|current| *current != time) {
            self.time.set(time);
        }
    }
}

#[component]
pub fn InfoBox(info: RwSignal<Option<InfoContent>>, pointer: RwSignal<(f64, f64)>) -> impl IntoView {
    view! {
        <div
            id="map-infobox"
            style:display=move || if info.with(Option::is_some) { "block" } else { "none" }
            style:left=move || format!("{}px", pointer.get().0 + INFO_OFFSET)
            style:top=move || format!("{}px", pointer.get().1 + INFO_OFFSET)
            style="position: fixed; z-index: 30; padding: 3px 6px; max-width: 270px; overflow: hidden; pointer-events: none; font-family: 'Trebuchet MS', Verdana, Arial, sans-serif; font-size: 13px; color: #444444; background-color: rgba(255, 255, 255, .75); border: 1px solid #CDCDCD; border-radius: 5px;"
        >
            {move || {
                info.get()
                    .map(|content| {
                        let facts = content
                            .facts
                            .into_iter()
                            .map(|(title, value)| view! { <div>{title}": "{value}</div> })
                            .collect_view();
                        let details = (!content.details.is_empty())
                            .then(|| {
                                let rows = content
                                    .details
                                    .into_iter()
                                    .map(|(column, value)| {
                                        view! {
                                            <div>
                                                <b>{column}</b>
                                                ": "
                                                {value}
                                            </div>
                                        }
                                    })
                                    .collect_view();
                                view! { <div style="margin-top: 5px;">{rows}</div> }
                            });
                        view! {
                            <b>{content.title}</b>
                            {content.subtitle.map(|subtitle| view! { <div>{subtitle}</div> })}
                            {facts}
                            {details}
                        }
                    })
            }}
        </div>
    }
}

const BUTTON_STYLE: &str = "background: #FFFFFF; border: 1px solid #CDCDCD; border-radius: 4px; cursor: pointer; color: #444444; min-width: 28px; height: 28px; margin: 0 2px; font-size: 0.8rem;";

#[component]
pub fn TimeControls(
    time: RwSignal<Option<TimeView>>,
    on_command: Rc<dyn Fn(PlaybackCommand)>,
) -> impl IntoView {
    let button = |command: PlaybackCommand, icon: &'static str, title: &'static str| {
        let on_command = Rc::clone(&on_command);
        view! {
            <button title=title style=BUTTON_STYLE on:click=move |_| on_command(command)>
                {icon}
            </button>
        }
    };

    let on_scrub = {
        let on_command = Rc::clone(&on_command);
        move |e: web_sys::Event| {
            if let Ok(index) = event_target_value(&e).parse::<usize>() {
                on_command(PlaybackCommand::Scrub(index));
            }
        }
    };

    let paused = move || time.with(|view| view.as_ref().is_none_or(|view| view.paused));
    let toggle = {
        let on_command = Rc::clone(&on_command);
        move |_: web_sys::MouseEvent| on_command(PlaybackCommand::TogglePlay)
    };

    view! {
        <div
            id="map-controls"
            style="position: absolute; left: 0; right: 0; bottom: 0; z-index: 25; display: flex; align-items: center; gap: 8px; padding: 6px 10px; background: rgba(255, 255, 255, .85); border-top: 1px solid #CDCDCD; font-family: 'Trebuchet MS', Verdana, Arial, sans-serif; font-size: 13px; color: #444444;"
        >
            <div id="map-control-buttons" style="display: flex; flex-shrink: 0;">
                {button(PlaybackCommand::Start, "⏮", "Start (Arrow up)")}
                {button(PlaybackCommand::Back, "⏪", "Back (Arrow left)")}
                <button
                    id="map-control-play-pause"
                    title=move || if paused() { "Play (Space)" } else { "Pause (Space)" }
                    style=BUTTON_STYLE
                    on:click=toggle
                >
                    {move || if paused() { "▶" } else { "⏸" }}
                </button>
                {button(PlaybackCommand::Forward, "⏩", "Forward (Arrow right)")}
                {button(PlaybackCommand::End, "⏭", "End (Arrow down)")}
            </div>
            <input
                id="map-slider"
                type="range"
                min="0"
                style="flex: 1;"
                style:visibility=move || {
                    if time.with(|view| view.as_ref().is_some_and(|view| view.has_series)) {
                        "visible"
                    } else {
                        "hidden"
                    }
                }
                max=move || time.with(|view| view.as_ref().and_then(|view| view.max).unwrap_or(0).to_string())
                prop:value=move || time.with(|view| view.as_ref().map_or(0, |view| view.current).to_string())
                on:input=on_scrub
            />
            <div id="map-speed-controls" style="display: flex; flex-shrink: 0;">
                {button(PlaybackCommand::Slower, "−", "Slower (-)")}
                {button(PlaybackCommand::Faster, "+", "Faster (+)")}
            </div>
            <span style="min-width: 2.5em; text-align: right;">
                {move || time.with(|view| view.as_ref().map_or(0, |view| view.speed).to_string())}
            </span>
            <div id="map-date" style="min-width: 6em; font-weight: bold; text-align: right;">
                {move || time.with(|view| view.as_ref().map(TimeView::label).unwrap_or_default())}
            </div>
        </div>
    }
}

/// Everything drawn over the map: the info box and, when enabled, the time
/// control bar.
#[component]
pub fn MapOverlay(
    overlay: Overlay,
    show_info: bool,
    show_time: bool,
    on_command: Rc<dyn Fn(PlaybackCommand)>,
) -> impl IntoView {
    view! {
        {show_info.then(|| view! { <InfoBox info=overlay.info pointer=overlay.pointer /> })}
        {show_time.then(|| view! { <TimeControls time=overlay.time on_command=on_command /> })}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_label_falls_back_to_the_index() {
        let mut view = TimeView {
            current: 3,
            max: None,
            paused: true,
            speed: 10,
            date: None,
            has_series: false,
        };
        assert_eq!(view.label(), "3");
        view.date = Some("2021-05".to_string());
        assert_eq!(view.label(), "2021-05");
    }
}
