//! Headless demo: drives an application through a short lifecycle on a
//! recording context and logs what the state cache saved.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;

use gles3d::gls::{GlContext, HeadlessContext};
use gles3d::{
    AppConfig, Application, Color, EventKind, Geometry, Graphic, Light, Material, Panel,
    PlatformEvent, Texture2D, TouchEvent, TouchPhase, Vec3, bridge,
};

fn build_scene(app: &mut Application) {
    let checker = Arc::new(Texture2D::checkerboard(64, 8, [255, 255, 255, 255], [40, 40, 40, 255]));

    let floor = app.scene.create_node("floor");
    app.scene.nodes_mut().set_position(floor, Vec3::new(0.0, -1.0, 0.0));
    app.scene.add_graphic(Graphic::mesh(
        floor,
        Arc::new(Geometry::plane(10.0, 10.0)),
        Material::basic(Color::WHITE).texture(checker),
    ));

    let cube = Arc::new(Geometry::cube(1.0));
    for (i, color) in [Color::RED, Color::GREEN, Color::BLUE].into_iter().enumerate() {
        let node = app.scene.create_node(format!("cube{i}"));
        app.scene
            .nodes_mut()
            .set_position(node, Vec3::new(i as f32 * 1.5 - 1.5, 0.0, 0.0));
        app.scene
            .add_graphic(Graphic::mesh(node, cube.clone(), Material::standard(color)));
    }

    let path = app.scene.create_node("path");
    let points: Vec<Vec3> = (0..32)
        .map(|i| {
            let a = i as f32 / 31.0 * std::f32::consts::TAU;
            Vec3::new(a.cos() * 3.0, 0.5, a.sin() * 3.0)
        })
        .collect();
    app.scene.add_graphic(Graphic::line_strip(
        path,
        Arc::new(Geometry::line_strip(&points)),
        Material::basic(Color::WHITE).line_width(2.0),
    ));

    let sun = app.scene.create_node("sun");
    app.scene.nodes_mut().look_at(sun, Vec3::new(-1.0, -2.0, -1.0), Vec3::Y);
    app.scene.add_light(sun, Light::directional(Color::WHITE, 0.8));
    let sky = app.scene.create_node("sky");
    app.scene.add_light(sky, Light::ambient(Color::WHITE, 0.2));

    app.gui
        .add(Panel::new(16.0, 16.0, 240.0, 80.0).border(Color::GRAY));
}

fn main() {
    let config = AppConfig::new()
        .title("gles3d headless demo")
        .target_fps(120)
        .log_filter("gles3d=info");

    let ctx = HeadlessContext::new();
    let shared = ctx.clone();
    let (platform, events) = bridge();
    let mut app = Application::new(config, events, move || -> gles3d::Result<Box<dyn GlContext>> {
        Ok(Box::new(shared.clone()))
    });
    app.set_presenter(|| log::trace!("present"));
    app.subscribe(EventKind::Resize, |e| info!("resized: {e:?}"));
    build_scene(&mut app);

    // Stands in for the platform thread that owns the window.
    let feeder = thread::spawn(move || {
        platform.send(PlatformEvent::Alive);
        platform.send(PlatformEvent::Foreground);
        platform.send(PlatformEvent::Resize {
            width: 750,
            height: 1334,
        });
        let mut x = 400.0;
        platform.send(touch(x, TouchPhase::Begin));
        for _ in 0..30 {
            thread::sleep(Duration::from_millis(8));
            x += 4.0;
            platform.send(touch(x, TouchPhase::Move));
        }
        platform.send(touch(x, TouchPhase::End));
        thread::sleep(Duration::from_millis(50));
        platform.send(PlatformEvent::Quit);
    });

    while app.run_frame() {}
    if feeder.join().is_err() {
        log::error!("platform thread panicked");
    }

    if let Some(state) = app.state() {
        let stats = state.stats();
        info!(
            "{} frames, {} dropped, {} draw calls, {} capability toggles absorbed, {} uniform lookups cached",
            app.frame_count(),
            app.dropped_frames(),
            stats.draw_calls,
            stats.cap_hits,
            stats.uniloc_hits
        );
    }
    info!("context saw {} calls in total", ctx.calls().len());
    app.shutdown();
}

fn touch(x: f32, phase: TouchPhase) -> PlatformEvent {
    PlatformEvent::Touch(TouchEvent {
        x,
        y: 700.0,
        sequence: 1,
        phase,
    })
}
