//! Frame lifecycle tests against the recording fake device.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use lsv_platform::KeyCode;
use lsv_renderer::{
    FRAMES_IN_FLIGHT, FrameInfo, FrameOutcome, InputState, Renderer, RendererDesc,
    SceneRenderer, TargetInfo, TickOutcome, UiLayer, WindowSource,
};
use lsv_rhi::buffer::{Buffer, BufferUsage};
use lsv_rhi::command::CommandBuffer;
use lsv_rhi::gpu::{AcquireOutcome, Staleness, SubmitDesc};
use lsv_rhi::testing::{Event, FakeDevice, ScriptedAcquire};
use lsv_rhi::{ErrorKind, RhiResult};

const CLEAR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

struct FakeWindow {
    size: (u32, u32),
    polls: usize,
    quit_after: Option<usize>,
    /// Keys that go down during the next poll.
    presses: Vec<KeyCode>,
    input: InputState,
}

impl FakeWindow {
    fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            polls: 0,
            quit_after: None,
            presses: Vec::new(),
            input: InputState::new(),
        }
    }
}

impl WindowSource for FakeWindow {
    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        self.input.begin_iteration();
        for key in self.presses.drain(..) {
            self.input.on_key_pressed(key);
        }
    }

    fn quit_requested(&self) -> bool {
        self.quit_after.is_some_and(|n| self.polls > n)
    }

    fn input(&self) -> &InputState {
        &self.input
    }
}

/// Logs `(frame_number, held, just_pressed)` for one key on every update.
struct KeyWatcher {
    key: KeyCode,
    seen: Rc<RefCell<Vec<(u64, bool, bool)>>>,
}

impl SceneRenderer<FakeDevice> for KeyWatcher {
    fn update(&mut self, info: &FrameInfo, input: &InputState) {
        self.seen.borrow_mut().push((
            info.frame_number,
            input.is_key_held(self.key),
            input.is_key_pressed(self.key),
        ));
    }

    fn record(&mut self, _cmd: &CommandBuffer<FakeDevice>, _target: &TargetInfo) -> RhiResult<()> {
        Ok(())
    }
}

struct TriangleScene;

impl SceneRenderer<FakeDevice> for TriangleScene {
    fn record(&mut self, cmd: &CommandBuffer<FakeDevice>, target: &TargetInfo) -> RhiResult<()> {
        cmd.set_viewport_and_scissor(target.full_rect());
        cmd.draw(3);
        Ok(())
    }
}

#[derive(Default)]
struct CountingUi {
    begun: Vec<FrameInfo>,
    rendered: Vec<u64>,
}

impl UiLayer<FakeDevice> for CountingUi {
    type DrawData = u64;

    fn begin_frame(&mut self, info: &FrameInfo) {
        self.begun.push(*info);
    }

    fn end_frame(&mut self) -> u64 {
        self.begun.last().map_or(0, |info| info.frame_number)
    }

    fn render(
        &mut self,
        draw_data: &u64,
        cmd: &CommandBuffer<FakeDevice>,
        _target: &TargetInfo,
    ) -> RhiResult<()> {
        self.rendered.push(*draw_data);
        cmd.draw(6);
        Ok(())
    }
}

struct Harness {
    device: Arc<FakeDevice>,
    renderer: Renderer<FakeDevice>,
    window: FakeWindow,
    scenes: Vec<Box<dyn SceneRenderer<FakeDevice>>>,
    ui: CountingUi,
}

impl Harness {
    fn new() -> Self {
        let device = FakeDevice::new();
        let renderer = Renderer::new(
            device.clone(),
            &RendererDesc {
                surface_extent: extent(1280, 720),
                scene_extent: extent(600, 600),
                clear_color: CLEAR,
            },
        )
        .unwrap();

        Self {
            device,
            renderer,
            window: FakeWindow::new(1280, 720),
            scenes: vec![Box::new(TriangleScene)],
            ui: CountingUi::default(),
        }
    }

    fn tick(&mut self) -> RhiResult<TickOutcome> {
        self.renderer
            .tick(&mut self.window, &mut self.scenes, &mut self.ui)
    }

    fn tick_ok(&mut self) -> TickOutcome {
        self.tick().unwrap()
    }

    fn frame_number(&self) -> u64 {
        self.renderer.context().frame_number
    }

    /// Per-frame submissions (the immediate channel never waits on a semaphore).
    fn frame_submits(&self) -> Vec<SubmitDesc> {
        self.device
            .submits()
            .into_iter()
            .filter(|s| s.wait.is_some())
            .collect()
    }

    fn finish(self) {
        let device = self.device;
        drop(self.renderer);
        device.assert_clean();
    }
}

fn count(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

fn position(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("event not found in {events:#?}"))
}

fn presented(outcome: TickOutcome) -> bool {
    matches!(outcome, TickOutcome::Drawn(FrameOutcome::Presented { .. }))
}

#[test]
fn scenario_a_five_clean_frames() {
    let mut h = Harness::new();

    for _ in 0..5 {
        assert!(presented(h.tick_ok()));
    }

    assert_eq!(h.frame_number(), 5);
    assert_eq!(h.renderer.rebuild_count(), 0);
    assert!(!h.renderer.context().chain_stale);

    let events = h.device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::CreateSwapchain { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, Event::DestroySwapchain(_))), 0);
    assert_eq!(h.frame_submits().len(), 5);
    assert_eq!(h.device.present_count(), 5);
    assert_eq!(h.ui.rendered, vec![0, 1, 2, 3, 4]);
    assert_eq!(
        count(&events, |e| *e == Event::Draw { vertex_count: 3 }),
        5
    );

    h.finish();
}

#[test]
fn scenario_b_out_of_date_acquire_rebuilds_once() {
    let mut h = Harness::new();
    h.device
        .script_acquire(3, ScriptedAcquire::Stale(Staleness::OutOfDate));

    assert!(presented(h.tick_ok()));
    assert!(presented(h.tick_ok()));

    let old_chain = h.renderer.chain().unwrap();
    let old_swapchain = old_chain.handle();
    let old_images: HashSet<vk::Image> = (0..old_chain.image_count() as u32)
        .map(|i| old_chain.image(i).unwrap())
        .collect();
    let old_views: Vec<vk::ImageView> = (0..old_chain.image_count() as u32)
        .map(|i| old_chain.view(i).unwrap())
        .collect();

    // Frame 3 aborts
    h.device.clear_events();
    assert_eq!(
        h.tick_ok(),
        TickOutcome::Drawn(FrameOutcome::AcquireStale(Staleness::OutOfDate))
    );
    assert_eq!(h.frame_number(), 2);
    assert!(h.renderer.context().chain_stale);
    assert!(h.device.submits().is_empty());
    let events = h.device.events();
    assert!(!events.iter().any(|e| matches!(
        e,
        Event::BeginCommandBuffer(_)
            | Event::Barrier { .. }
            | Event::Submit(_)
            | Event::Present { .. }
    )));

    // Next iteration rebuilds once, then frame 3 is drawn again
    h.device.clear_events();
    assert!(presented(h.tick_ok()));
    assert_eq!(h.renderer.rebuild_count(), 1);
    assert_eq!(h.frame_number(), 3);
    assert!(!h.renderer.context().chain_stale);

    let events = h.device.events();
    assert_eq!(count(&events, |e| matches!(e, Event::CreateSwapchain { .. })), 1);
    let idle = position(&events, |e| *e == Event::WaitIdle);
    let destroyed = position(&events, |e| *e == Event::DestroySwapchain(old_swapchain));
    let created = position(&events, |e| matches!(e, Event::CreateSwapchain { .. }));
    assert!(idle < destroyed && destroyed < created);
    for view in old_views {
        assert!(position(&events, |e| *e == Event::DestroyImageView(view)) < destroyed);
    }

    // Nothing recorded after the rebuild touches the old chain
    for event in &events[created..] {
        match event {
            Event::Barrier { image, .. } => assert!(!old_images.contains(image)),
            Event::Blit { dst, .. } => assert!(!old_images.contains(dst)),
            Event::Acquire { swapchain, .. } | Event::Present { swapchain, .. } => {
                assert_ne!(*swapchain, old_swapchain)
            }
            _ => {}
        }
    }

    assert!(presented(h.tick_ok()));
    assert_eq!(h.renderer.rebuild_count(), 1);
    h.finish();
}

#[test]
fn fence_is_waited_before_slot_reuse() {
    let mut h = Harness::new();
    h.device.clear_events();

    for _ in 0..6 {
        assert!(presented(h.tick_ok()));
    }

    let events = h.device.events();
    let submits = h.frame_submits();
    for submit in &submits {
        let cmd = submit.command_buffer;
        let fence = submit.fence;
        // Every reset of this command buffer is preceded by a wait on, then a reset
        // of, the fence its previous submission signals.
        let mut awaited = true;
        for event in &events {
            match event {
                Event::Submit(s) if s.command_buffer == cmd => awaited = false,
                Event::WaitFence(f) if *f == fence => awaited = true,
                Event::ResetCommandBuffer(c) if *c == cmd => {
                    assert!(awaited, "command buffer reused before its fence was waited on")
                }
                _ => {}
            }
        }
    }

    h.device.assert_no_violations();
    h.finish();
}

#[test]
fn slot_follows_frame_number_modulo_two() {
    let mut h = Harness::new();
    for _ in 0..6 {
        h.tick_ok();
    }

    let fences: Vec<vk::Fence> = h.frame_submits().iter().map(|s| s.fence).collect();
    let distinct: HashSet<vk::Fence> = fences.iter().copied().collect();
    assert_eq!(distinct.len(), FRAMES_IN_FLIGHT);
    for (n, fence) in fences.iter().enumerate() {
        assert_eq!(*fence, fences[n % FRAMES_IN_FLIGHT]);
    }

    h.finish();
}

#[test]
fn present_staleness_still_completes_the_frame() {
    let mut h = Harness::new();
    h.device.script_present(2, Staleness::Suboptimal);

    assert!(presented(h.tick_ok()));
    assert_eq!(
        h.tick_ok(),
        TickOutcome::Drawn(FrameOutcome::PresentStale {
            image_index: 1,
            staleness: Staleness::Suboptimal
        })
    );

    // The frame counted and its submission carried the full signal contract
    assert_eq!(h.frame_number(), 2);
    assert!(h.renderer.context().chain_stale);
    let last = *h.frame_submits().last().unwrap();
    assert!(last.signal.is_some());
    assert_ne!(last.fence, vk::Fence::null());
    assert_eq!(
        last.wait.map(|(_, stage)| stage),
        Some(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
    );

    assert!(presented(h.tick_ok()));
    assert_eq!(h.renderer.rebuild_count(), 1);
    assert_eq!(h.frame_number(), 3);
    h.finish();
}

#[test]
fn suboptimal_acquire_aborts_and_recovers() {
    let mut h = Harness::new();
    h.device
        .script_acquire(1, ScriptedAcquire::Stale(Staleness::Suboptimal));

    assert_eq!(
        h.tick_ok(),
        TickOutcome::Drawn(FrameOutcome::AcquireStale(Staleness::Suboptimal))
    );
    assert_eq!(h.frame_number(), 0);
    assert!(h.frame_submits().is_empty());

    // The signaled acquire semaphore goes away with the old ring
    for _ in 0..3 {
        assert!(presented(h.tick_ok()));
    }
    assert_eq!(h.renderer.rebuild_count(), 1);
    h.device.assert_no_violations();
    h.finish();
}

#[test]
fn acquire_timeout_is_fatal() {
    let mut h = Harness::new();
    h.device.script_acquire(1, ScriptedAcquire::Timeout);

    let err = h.tick().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SynchronizationTimeout);
    assert_eq!(h.frame_number(), 0);
    assert!(h.frame_submits().is_empty());
    h.finish();
}

#[test]
fn zero_area_window_skips_without_rebuilding() {
    let mut h = Harness::new();
    h.device
        .script_acquire(1, ScriptedAcquire::Stale(Staleness::OutOfDate));
    h.tick_ok();
    assert!(h.renderer.context().chain_stale);

    h.window.size = (0, 0);
    let acquires = h.device.acquire_count();
    assert_eq!(h.tick_ok(), TickOutcome::Skipped);
    assert_eq!(h.tick_ok(), TickOutcome::Skipped);
    assert_eq!(h.device.acquire_count(), acquires);
    assert_eq!(h.renderer.rebuild_count(), 0);
    assert!(h.renderer.context().chain_stale);
    assert_eq!(h.ui.begun.len(), 1);

    h.window.size = (1280, 720);
    assert!(presented(h.tick_ok()));
    assert_eq!(h.renderer.rebuild_count(), 1);
    h.finish();
}

#[test]
fn resize_rebuilds_chain_and_main_image() {
    let mut h = Harness::new();
    assert!(presented(h.tick_ok()));

    let scene_image = h.renderer.targets().scene().image();
    h.window.size = (800, 600);
    h.device
        .script_acquire(2, ScriptedAcquire::Stale(Staleness::OutOfDate));
    h.tick_ok();
    assert!(presented(h.tick_ok()));

    assert_eq!(h.renderer.chain().unwrap().extent(), extent(800, 600));
    assert_eq!(h.renderer.targets().main().extent(), extent(800, 600));
    assert_eq!(h.renderer.targets().scene().image(), scene_image);

    let blit = h
        .device
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Blit {
                src_extent,
                dst_extent,
                ..
            } => Some((src_extent, dst_extent)),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(blit, (extent(800, 600), extent(800, 600)));
    h.finish();
}

#[test]
fn record_sequence_per_frame() {
    let mut h = Harness::new();
    h.device.clear_events();
    h.tick_ok();

    let scene = h.renderer.targets().scene().image();
    let main = h.renderer.targets().main().image();
    let swapchain_image = h.renderer.chain().unwrap().image(0).unwrap();
    let events = h.device.events();

    let barriers: Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)> = events
        .iter()
        .filter_map(|e| match e {
            Event::Barrier {
                image, old, new, ..
            } => Some((*image, *old, *new)),
            _ => None,
        })
        .collect();

    use vk::ImageLayout as L;
    assert_eq!(
        barriers,
        vec![
            (scene, L::UNDEFINED, L::GENERAL),
            (scene, L::GENERAL, L::COLOR_ATTACHMENT_OPTIMAL),
            (scene, L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            (main, L::UNDEFINED, L::GENERAL),
            (main, L::GENERAL, L::COLOR_ATTACHMENT_OPTIMAL),
            (main, L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (swapchain_image, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            (swapchain_image, L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR),
        ]
    );

    let clears: Vec<vk::Image> = events
        .iter()
        .filter_map(|e| match e {
            Event::ClearColor { image, color, .. } if *color == CLEAR => Some(*image),
            _ => None,
        })
        .collect();
    assert_eq!(clears, vec![scene, main]);

    // Scene draw happens inside the scene pass, UI draw inside the main pass
    let scene_view = h.renderer.targets().scene().view();
    let main_view = h.renderer.targets().main().view();
    let scene_pass = position(&events, |e| {
        matches!(e, Event::BeginRendering { view, .. } if *view == scene_view)
    });
    let main_pass = position(&events, |e| {
        matches!(e, Event::BeginRendering { view, .. } if *view == main_view)
    });
    let scene_draw = position(&events, |e| *e == Event::Draw { vertex_count: 3 });
    let ui_draw = position(&events, |e| *e == Event::Draw { vertex_count: 6 });
    assert!(scene_pass < scene_draw && scene_draw < main_pass && main_pass < ui_draw);

    let blit = position(&events, |e| {
        matches!(e, Event::Blit { src, dst, .. } if *src == main && *dst == swapchain_image)
    });
    let submit = position(&events, |e| matches!(e, Event::Submit(_)));
    assert!(ui_draw < blit && blit < submit);

    h.finish();
}

#[test]
fn repeated_frames_record_identical_transitions() {
    let mut h = Harness::new();
    h.tick_ok();
    h.tick_ok();

    let per_frame: Vec<Vec<(vk::ImageLayout, vk::ImageLayout)>> = h
        .frame_submits()
        .iter()
        .map(|submit| {
            h.device
                .events()
                .iter()
                .filter_map(|e| match e {
                    Event::Barrier { cmd, old, new, .. } if *cmd == submit.command_buffer => {
                        Some((*old, *new))
                    }
                    _ => None,
                })
                .collect()
        })
        .collect();

    assert_eq!(per_frame.len(), 2);
    assert_eq!(per_frame[0].len(), 8);
    assert_eq!(per_frame[0], per_frame[1]);
    h.finish();
}

#[test]
fn scenario_c_immediate_upload_releases_staging_after_wait() {
    let h = Harness::new();
    let dst = Buffer::new(h.device.clone(), BufferUsage::Vertex, 64).unwrap();

    h.device.clear_events();
    h.renderer.immediate().upload_buffer(&dst, &[7u8; 64]).unwrap();

    let events = h.device.events();
    let staging = events
        .iter()
        .find_map(|e| match e {
            Event::CreateBuffer(buffer) => Some(*buffer),
            _ => None,
        })
        .unwrap();
    assert_ne!(staging, dst.handle());

    let copy = position(&events, |e| {
        *e == Event::CopyBuffer {
            src: staging,
            dst: dst.handle(),
            size: 64,
        }
    });
    let submit = position(&events, |e| matches!(e, Event::Submit(_)));
    let wait = position(&events, |e| matches!(e, Event::WaitFence(_)));
    let destroy = position(&events, |e| *e == Event::DestroyBuffer(staging));
    assert!(copy < submit && submit < wait && wait < destroy);
    assert_eq!(count(&events, |e| *e == Event::DestroyBuffer(staging)), 1);

    drop(dst);
    h.finish();
}

#[test]
fn run_until_quit() {
    let mut h = Harness::new();
    h.window.quit_after = Some(4);

    h.renderer
        .run(&mut h.window, &mut h.scenes, &mut h.ui)
        .unwrap();

    assert_eq!(h.frame_number(), 4);
    assert_eq!(h.device.events().last(), Some(&Event::WaitIdle));
    h.finish();
}

#[test]
fn acquire_hands_out_chain_images_in_turn() {
    let mut h = Harness::new();
    h.tick_ok();
    h.tick_ok();
    h.tick_ok();

    let indices: Vec<u32> = h
        .device
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Acquire {
                outcome: AcquireOutcome::Acquired { image_index },
                ..
            } => Some(*image_index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 0]);
    h.finish();
}

#[test]
fn scenes_see_input_polled_this_iteration() {
    let mut h = Harness::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    h.scenes.push(Box::new(KeyWatcher {
        key: KeyCode::Space,
        seen: seen.clone(),
    }));

    h.tick_ok();
    h.window.presses.push(KeyCode::Space);
    h.tick_ok();
    h.tick_ok();

    // Minimized iterations poll but do not update the scene
    h.window.size = (0, 0);
    assert_eq!(h.tick_ok(), TickOutcome::Skipped);

    assert_eq!(
        *seen.borrow(),
        vec![(0, false, false), (1, true, true), (2, true, false)]
    );
    h.finish();
}
