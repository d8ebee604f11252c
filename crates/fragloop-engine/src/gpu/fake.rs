//! Recording stand-in for a GL context.
//!
//! Tracks every live resource so tests can check release discipline, and "shades" just
//! enough GLSL to make pixel checks meaningful:
//! - a line containing `SYNTAX_ERROR` fails compilation with an `ERROR: 0:<line>:` log
//! - a fragment source without `main` fails to link
//! - with `desktop_glsl` set, a `precision` statement outside `#ifdef GL_ES` fails to
//!   compile, as GLSL 1.10/1.20 drivers do
//! - `uniform`/`attribute` declarations become resolvable locations
//! - `gl_FragColor = vec4(r, g, b, a)` writes a constant color
//! - `gl_FragColor = texture2D(<sampler>, ...)` copies the texture on the sampler's unit

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{GpuContext, ShaderStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct FakeLoc {
    program: Id,
    name: String,
}

#[derive(Debug)]
pub struct ShaderRec {
    pub stage: ShaderStage,
    pub source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Clone)]
enum Shading {
    Constant([u8; 4]),
    Sample { sampler: String },
}

#[derive(Debug)]
pub struct ProgramRec {
    attached: Vec<Id>,
    log: String,
    uniforms: HashSet<String>,
    attribs: HashMap<String, u32>,
    shading: Option<Shading>,
    sampler_units: HashMap<String, i32>,
}

#[derive(Debug)]
pub struct TextureRec {
    pub width: i32,
    pub height: i32,
    pub content: [u8; 4],
}

#[derive(Debug, Clone)]
pub struct DrawRecord {
    /// `None` is the visible surface.
    pub target: Option<Id>,
    pub program: Option<Id>,
    pub feedback: Option<Id>,
    pub present: Option<Id>,
    pub color: [u8; 4],
}

#[derive(Debug, Default)]
pub struct FakeState {
    next_id: u32,
    pub shaders: HashMap<Id, ShaderRec>,
    pub programs: HashMap<Id, ProgramRec>,
    pub textures: HashMap<Id, TextureRec>,
    pub renderbuffers: HashSet<Id>,
    pub framebuffers: HashMap<Id, (Id, Id)>,
    pub buffers: HashSet<Id>,
    bound_fb: Option<Id>,
    units: HashMap<u32, Id>,
    current: Option<Id>,
    pub screen: [u8; 4],
    pub viewport: (i32, i32),
    pub compiles: usize,
    pub flushes: usize,
    pub texture_allocs: usize,
    pub draws: Vec<DrawRecord>,
    pub uniform_writes: Vec<(String, Vec<f32>)>,
    pub fail_alloc: bool,
    pub fail_compile: bool,
    pub fail_buffer: bool,
    pub desktop_glsl: bool,
    pub extensions: HashSet<String>,
}

impl FakeState {
    fn id(&mut self) -> Id {
        self.next_id += 1;
        Id(self.next_id)
    }

    pub fn live_gpu_objects(&self) -> usize {
        self.shaders.len()
            + self.programs.len()
            + self.textures.len()
            + self.renderbuffers.len()
            + self.framebuffers.len()
            + self.buffers.len()
    }

    /// Last value written to the named uniform.
    pub fn last_uniform(&self, name: &str) -> Option<&[f32]> {
        self.uniform_writes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    fn write_target(&mut self, color: [u8; 4]) {
        let attachment = self.bound_fb.and_then(|fb| self.framebuffers.get(&fb).copied());
        match attachment {
            Some((tex, _)) => {
                if let Some(t) = self.textures.get_mut(&tex) {
                    t.content = color;
                }
            }
            None => self.screen = color,
        }
    }
}

/// Clones share one state, so a test can keep watching after handing the GPU to an engine.
#[derive(Debug, Default, Clone)]
pub struct FakeGpu {
    state: Rc<RefCell<FakeState>>,
}

impl FakeGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }
}

fn declarations<'a>(source: &'a str, keyword: &str) -> Vec<&'a str> {
    source
        .split(';')
        .filter_map(|stmt| {
            let mut toks = stmt.split_whitespace();
            (toks.next() == Some(keyword)).then(|| toks.last()).flatten()
        })
        .collect()
}

// 1-based line of the first `precision` statement not inside an `#ifdef GL_ES` block.
fn unguarded_precision(source: &str) -> Option<usize> {
    let mut guarded = 0usize;
    for (idx, line) in source.lines().enumerate() {
        let t = line.trim_start();
        if t.starts_with("#ifdef GL_ES") {
            guarded += 1;
        } else if t.starts_with("#endif") {
            guarded = guarded.saturating_sub(1);
        } else if guarded == 0 && t.starts_with("precision") {
            return Some(idx + 1);
        }
    }
    None
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn parse_shading(fragment: &str) -> Shading {
    let expr = fragment
        .split("gl_FragColor")
        .nth(1)
        .and_then(|rest| rest.split(';').next())
        .unwrap_or("");

    if let Some(args) = expr.split("texture2D(").nth(1) {
        let sampler = args.split(',').next().unwrap_or("").trim().to_string();
        return Shading::Sample { sampler };
    }

    let parsed: Option<Vec<f32>> = expr
        .split("vec4(")
        .nth(1)
        .and_then(|args| args.split(')').next())
        .map(|args| args.split(',').filter_map(|a| a.trim().parse::<f32>().ok()).collect());
    match parsed {
        Some(v) if v.len() == 4 => Shading::Constant([to_u8(v[0]), to_u8(v[1]), to_u8(v[2]), to_u8(v[3])]),
        _ => Shading::Constant([0, 0, 0, 255]),
    }
}

impl GpuContext for FakeGpu {
    type Shader = Id;
    type Program = Id;
    type Texture = Id;
    type Renderbuffer = Id;
    type Framebuffer = Id;
    type Buffer = Id;
    type UniformLocation = FakeLoc;

    fn create_shader(&self, stage: ShaderStage) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        let id = s.id();
        s.shaders.insert(
            id,
            ShaderRec { stage, source: String::new(), compiled: false, log: String::new() },
        );
        Ok(id)
    }

    fn compile_shader(&self, shader: Id, source: &str) -> bool {
        let mut s = self.state.borrow_mut();
        s.compiles += 1;
        let error = if s.fail_compile {
            Some("ERROR: 0:1: '' : compiler unavailable\n".to_string())
        } else if let Some(line) = source.lines().position(|l| l.contains("SYNTAX_ERROR")) {
            Some(format!(
                "ERROR: 0:{}: 'SYNTAX_ERROR' : syntax error\nERROR: 1 compilation errors.  No code generated.\n",
                line + 1
            ))
        } else if s.desktop_glsl {
            unguarded_precision(source)
                .map(|line| format!("0:{line}(1): error: syntax error, unexpected PRECISION\n"))
        } else {
            None
        };

        let Some(rec) = s.shaders.get_mut(&shader) else {
            return false;
        };
        rec.source = source.to_string();
        rec.compiled = error.is_none();
        rec.log = error.unwrap_or_default();
        rec.compiled
    }

    fn shader_info_log(&self, shader: Id) -> String {
        self.state.borrow().shaders.get(&shader).map(|r| r.log.clone()).unwrap_or_default()
    }

    fn delete_shader(&self, shader: Id) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    fn create_program(&self) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        let id = s.id();
        s.programs.insert(
            id,
            ProgramRec {
                attached: Vec::new(),
                log: String::new(),
                uniforms: HashSet::new(),
                attribs: HashMap::new(),
                shading: None,
                sampler_units: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn attach_shader(&self, program: Id, shader: Id) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.push(shader);
        }
    }

    fn detach_shader(&self, program: Id, shader: Id) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.retain(|s| *s != shader);
        }
    }

    fn link_program(&self, program: Id) -> bool {
        let mut s = self.state.borrow_mut();
        let attached = match s.programs.get(&program) {
            Some(p) => p.attached.clone(),
            None => return false,
        };

        let mut uniforms = HashSet::new();
        let mut attribs = HashMap::new();
        let mut fragment = None;
        let mut ok = true;
        for sh in &attached {
            let Some(rec) = s.shaders.get(sh) else {
                ok = false;
                continue;
            };
            ok &= rec.compiled;
            uniforms.extend(declarations(&rec.source, "uniform").into_iter().map(str::to_string));
            for name in declarations(&rec.source, "attribute") {
                let next = attribs.len() as u32;
                attribs.entry(name.to_string()).or_insert(next);
            }
            if rec.stage == ShaderStage::Fragment {
                fragment = Some(rec.source.clone());
            }
        }

        let log = match &fragment {
            _ if !ok => Some("ERROR: one or more attached shaders not successfully compiled\n".to_string()),
            Some(src) if !src.contains("main") => {
                Some("error: fragment shader lacks `main'\n".to_string())
            }
            None => Some("error: no fragment shader attached\n".to_string()),
            _ => None,
        };

        let Some(p) = s.programs.get_mut(&program) else {
            return false;
        };
        match log {
            Some(log) => {
                p.log = log;
                false
            }
            None => {
                p.uniforms = uniforms;
                p.attribs = attribs;
                p.shading = fragment.as_deref().map(parse_shading);
                true
            }
        }
    }

    fn program_info_log(&self, program: Id) -> String {
        self.state.borrow().programs.get(&program).map(|p| p.log.clone()).unwrap_or_default()
    }

    fn delete_program(&self, program: Id) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(&program);
        if s.current == Some(program) {
            s.current = None;
        }
    }

    fn use_program(&self, program: Option<Id>) {
        self.state.borrow_mut().current = program;
    }

    fn uniform_location(&self, program: Id, name: &str) -> Option<FakeLoc> {
        let s = self.state.borrow();
        let p = s.programs.get(&program)?;
        p.uniforms
            .contains(name)
            .then(|| FakeLoc { program, name: name.to_string() })
    }

    fn attrib_location(&self, program: Id, name: &str) -> Option<u32> {
        self.state.borrow().programs.get(&program)?.attribs.get(name).copied()
    }

    fn uniform_1f(&self, location: &FakeLoc, v: f32) {
        self.state.borrow_mut().uniform_writes.push((location.name.clone(), vec![v]));
    }

    fn uniform_2f(&self, location: &FakeLoc, x: f32, y: f32) {
        self.state.borrow_mut().uniform_writes.push((location.name.clone(), vec![x, y]));
    }

    fn uniform_1i(&self, location: &FakeLoc, v: i32) {
        let mut s = self.state.borrow_mut();
        s.uniform_writes.push((location.name.clone(), vec![v as f32]));
        if let Some(p) = s.programs.get_mut(&location.program) {
            p.sampler_units.insert(location.name.clone(), v);
        }
    }

    fn create_color_texture(&self, width: i32, height: i32) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        if s.fail_alloc {
            return Err("color texture: out of GPU memory".to_string());
        }
        s.texture_allocs += 1;
        let id = s.id();
        s.textures.insert(id, TextureRec { width, height, content: [0, 0, 0, 0] });
        Ok(id)
    }

    fn delete_texture(&self, texture: Id) {
        let mut s = self.state.borrow_mut();
        s.textures.remove(&texture);
        s.units.retain(|_, t| *t != texture);
    }

    fn create_depth_buffer(&self, _width: i32, _height: i32) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        let id = s.id();
        s.renderbuffers.insert(id);
        Ok(id)
    }

    fn delete_renderbuffer(&self, renderbuffer: Id) {
        self.state.borrow_mut().renderbuffers.remove(&renderbuffer);
    }

    fn create_framebuffer(&self, color: Id, depth: Id) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        if !s.textures.contains_key(&color) || !s.renderbuffers.contains(&depth) {
            return Err("framebuffer incomplete: 0x8cd6".to_string());
        }
        let id = s.id();
        s.framebuffers.insert(id, (color, depth));
        Ok(id)
    }

    fn delete_framebuffer(&self, framebuffer: Id) {
        let mut s = self.state.borrow_mut();
        s.framebuffers.remove(&framebuffer);
        if s.bound_fb == Some(framebuffer) {
            s.bound_fb = None;
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<Id>) {
        self.state.borrow_mut().bound_fb = framebuffer;
    }

    fn bind_texture(&self, unit: u32, texture: Option<Id>) {
        let mut s = self.state.borrow_mut();
        match texture {
            Some(t) => s.units.insert(unit, t),
            None => s.units.remove(&unit),
        };
    }

    fn viewport(&self, width: i32, height: i32) {
        self.state.borrow_mut().viewport = (width, height);
    }

    fn clear(&self, rgba: [f32; 4]) {
        let color = [to_u8(rgba[0]), to_u8(rgba[1]), to_u8(rgba[2]), to_u8(rgba[3])];
        self.state.borrow_mut().write_target(color);
    }

    fn create_vertex_buffer(&self, _data: &[f32]) -> Result<Id, String> {
        let mut s = self.state.borrow_mut();
        if s.fail_buffer {
            return Err("vertex buffer: out of GPU memory".to_string());
        }
        let id = s.id();
        s.buffers.insert(id);
        Ok(id)
    }

    fn delete_buffer(&self, buffer: Id) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn bind_vertex_attrib(&self, _buffer: Id, _index: u32, _components: i32) {}

    fn draw_triangle_strip(&self, _count: i32) {
        let mut s = self.state.borrow_mut();
        let program = s.current;
        let shading = program.and_then(|p| s.programs.get(&p)).and_then(|p| {
            let shading = p.shading.clone()?;
            Some((shading, p.sampler_units.clone()))
        });
        let color = match shading {
            Some((Shading::Constant(c), _)) => c,
            Some((Shading::Sample { sampler }, units)) => {
                let unit = units.get(&sampler).copied().unwrap_or(0) as u32;
                s.units
                    .get(&unit)
                    .and_then(|t| s.textures.get(t))
                    .map(|t| t.content)
                    .unwrap_or([0, 0, 0, 0])
            }
            None => [0, 0, 0, 0],
        };
        s.write_target(color);
        let record = DrawRecord {
            target: s.bound_fb,
            program,
            feedback: s.units.get(&super::FEEDBACK_UNIT).copied(),
            present: s.units.get(&super::PRESENT_UNIT).copied(),
            color,
        };
        s.draws.push(record);
    }

    fn flush(&self) {
        self.state.borrow_mut().flushes += 1;
    }

    fn supports_extension(&self, name: &str) -> bool {
        self.state.borrow().extensions.contains(name)
    }

    fn read_pixel(&self, _x: i32, _y: i32) -> [u8; 4] {
        let s = self.state.borrow();
        match s.bound_fb.and_then(|fb| s.framebuffers.get(&fb)) {
            Some((tex, _)) => s.textures.get(tex).map(|t| t.content).unwrap_or_default(),
            None => s.screen,
        }
    }
}
