//! Effects demo
//!
//! Renders a lit spinning cube over a ground plane, three orbiting
//! point lights and the GPU particle effect. Doubles as the integration
//! smoke test for the frame protocol: resize and minimize the window to
//! exercise the swapchain rebuild paths.

use std::time::Instant;

use nalgebra::{Matrix4, Perspective3, Point3, Vector3};

use render_engine::config::{Config, EngineConfig};
use render_engine::render::{
    CameraUniformData, EffectKind, FrameUniforms, LightKey, MeshData, MeshVertex, PointLight,
    RenderObjectKey, VulkanRenderer,
};
use render_engine::window::Window;

const CONFIG_PATH: &str = "engine.toml";
const SHADER_DIR: &str = "effects_app/shaders";

struct App {
    window: Window,
    renderer: VulkanRenderer,
    config: EngineConfig,
    cube: RenderObjectKey,
    lights: Vec<LightKey>,
    start: Instant,
    last_frame: Instant,
}

impl App {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config = match EngineConfig::load_from_file(CONFIG_PATH) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Could not load {}: {}; using defaults", CONFIG_PATH, e);
                EngineConfig::default()
            }
        };

        let mut window = Window::new(
            &config.window.title,
            config.window.width,
            config.window.height,
        )?;
        let mut renderer = VulkanRenderer::new(&mut window, &config, SHADER_DIR)?;

        let cube = renderer.load_render_object(&cube_mesh(1.0), EffectKind::Lit, None, None)?;
        let floor = renderer.load_render_object(&plane_mesh(10.0), EffectKind::Lit, None, None)?;
        if let Some(object) = renderer.object_mut(floor) {
            object.model = Matrix4::new_translation(&Vector3::new(0.0, -1.0, 0.0));
            object.color = [0.35, 0.35, 0.4, 1.0];
        }

        let lights = (0..3)
            .map(|i| {
                renderer.create_light(PointLight {
                    position: [0.0, 2.0, 0.0],
                    color: light_color(i),
                    intensity: 3.0,
                    radius: 15.0,
                })
            })
            .collect();

        let now = Instant::now();
        Ok(Self {
            window,
            renderer,
            config,
            cube,
            lights,
            start: now,
            last_frame: now,
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while self.window.is_active() {
            self.window.poll_events();

            if self.window.is_minimized() {
                self.window.wait_events();
                continue;
            }

            let now = Instant::now();
            let delta = now.duration_since(self.last_frame).as_secs_f32();
            let elapsed = now.duration_since(self.start).as_secs_f32();
            self.last_frame = now;

            self.update(elapsed);

            let uniforms = FrameUniforms {
                camera: self.camera(),
                delta_time: delta,
                elapsed,
            };
            self.renderer.render(&mut self.window, &uniforms)?;
        }

        self.renderer.wait_idle()?;
        Ok(())
    }

    fn update(&mut self, elapsed: f32) {
        if let Some(object) = self.renderer.object_mut(self.cube) {
            object.model = Matrix4::from_euler_angles(0.0, elapsed * 0.8, 0.0);
            object.color = [0.8, 0.7, 0.5, 1.0];
        }

        let count = self.lights.len();
        for (i, &key) in self.lights.iter().enumerate() {
            let phase = elapsed * 0.6 + (i as f32) * std::f32::consts::TAU / count as f32;
            self.renderer.update_light(
                key,
                PointLight {
                    position: [3.0 * phase.cos(), 2.0, 3.0 * phase.sin()],
                    color: light_color(i),
                    intensity: 3.0,
                    radius: 15.0,
                },
            );
        }
    }

    fn camera(&self) -> CameraUniformData {
        let position = self.config.camera.position;
        let eye = Point3::new(position[0], position[1], position[2]);
        let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());

        let extent = self.renderer.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut projection = Perspective3::new(aspect, 45f32.to_radians(), 0.1, 100.0)
            .to_homogeneous();
        // GL-style clip space to Vulkan: flip Y
        projection[(1, 1)] *= -1.0;

        CameraUniformData::new(&view, &projection, position)
    }
}

fn light_color(index: usize) -> [f32; 3] {
    match index {
        0 => [1.0, 0.6, 0.3],
        1 => [0.3, 0.6, 1.0],
        _ => [0.5, 1.0, 0.5],
    }
}

fn cube_mesh(half: f32) -> MeshData {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // (normal, tangent u, tangent v)
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    let mut mesh = MeshData::default();
    for (normal, u, v) in faces {
        let base = mesh.vertices.len() as u32;
        let n = Vector3::from(normal);
        let u = Vector3::from(u);
        let v = Vector3::from(v);
        let corners = [
            (-1.0f32, -1.0f32, [0.0, 0.0]),
            (1.0, -1.0, [1.0, 0.0]),
            (1.0, 1.0, [1.0, 1.0]),
            (-1.0, 1.0, [0.0, 1.0]),
        ];
        for (cu, cv, tex) in corners {
            let position = (n + u * cu + v * cv) * half;
            mesh.vertices.push(MeshVertex {
                position: position.into(),
                normal,
                tex_coord: tex,
            });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

fn plane_mesh(half: f32) -> MeshData {
    MeshData {
        vertices: vec![
            MeshVertex {
                position: [-half, 0.0, -half],
                normal: [0.0, 1.0, 0.0],
                tex_coord: [0.0, 0.0],
            },
            MeshVertex {
                position: [half, 0.0, -half],
                normal: [0.0, 1.0, 0.0],
                tex_coord: [1.0, 0.0],
            },
            MeshVertex {
                position: [half, 0.0, half],
                normal: [0.0, 1.0, 0.0],
                tex_coord: [1.0, 1.0],
            },
            MeshVertex {
                position: [-half, 0.0, half],
                normal: [0.0, 1.0, 0.0],
                tex_coord: [0.0, 1.0],
            },
        ],
        indices: vec![0, 2, 1, 0, 3, 2],
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = App::new().and_then(|mut app| app.run()) {
        log::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
