use godot::classes::editor_plugin::AfterGuiInput;
use godot::classes::editor_plugin::CustomControlContainer;
use godot::classes::{
    Button, Camera3D, EditorPlugin, HBoxContainer, HSlider, IEditorPlugin, InputEvent,
    InputEventKey, InputEventMouseButton, InputEventMouseMotion, Label, MarginContainer,
    VBoxContainer, VSeparator,
};
use godot::global::{Key, MouseButton};
use godot::prelude::*;

use crate::config::{BrushLimits, NUM_TERRAIN_LAYERS};

/// Height scale and noise scale used by the Generate button.
const GENERATE_HEIGHT_SCALE: f32 = 12.0;
const GENERATE_NOISE_SCALE: f32 = 0.02;

#[derive(GodotClass)]
#[class(tool, init, base=EditorPlugin)]
pub struct RacingTerrainPlugin {
    base: Base<EditorPlugin>,
    #[init(val = None)]
    current_terrain: Option<Gd<Node>>,
    #[init(val = None)]
    margin_container: Option<Gd<MarginContainer>>,

    #[init(val = None)]
    tool_button: Option<Gd<Button>>,
    #[init(val = None)]
    radius_slider: Option<Gd<HSlider>>,
    #[init(val = None)]
    strength_slider: Option<Gd<HSlider>>,
    #[init(val = None)]
    falloff_slider: Option<Gd<HSlider>>,
    #[init(val = [None, None, None, None])]
    layer_buttons: [Option<Gd<Button>>; NUM_TERRAIN_LAYERS],

    #[init(val = false)]
    is_modifying: bool,
}

#[godot_api]
impl IEditorPlugin for RacingTerrainPlugin {
    fn enter_tree(&mut self) {
        let limits = BrushLimits::default();

        let mut margin_container = MarginContainer::new_alloc();
        margin_container.set_name("RacingTerrainMargin");
        margin_container.set_visible(false);
        margin_container.set_custom_minimum_size(Vector2::new(140.0, 0.0));
        margin_container.add_theme_constant_override("margin_top", 8);
        margin_container.add_theme_constant_override("margin_left", 8);
        margin_container.add_theme_constant_override("margin_right", 8);
        margin_container.add_theme_constant_override("margin_bottom", 8);

        let mut toolbar = VBoxContainer::new_alloc();
        toolbar.set_name("RacingTerrainToolbar");
        toolbar.add_theme_constant_override("separation", 4);

        // ═══════════════════════════════════════════════════════════════════
        // Terrain Section
        // ═══════════════════════════════════════════════════════════════════
        let mut terrain_label = Label::new_alloc();
        terrain_label.set_text("Terrain");
        toolbar.add_child(&terrain_label);

        let mut generate_button = Button::new_alloc();
        generate_button.set_text("Generate (G)");
        generate_button.set_custom_minimum_size(Vector2::new(100.0, 28.0));
        toolbar.add_child(&generate_button);

        let mut collision_button = Button::new_alloc();
        collision_button.set_text("Rebuild Collision");
        collision_button.set_custom_minimum_size(Vector2::new(100.0, 28.0));
        toolbar.add_child(&collision_button);

        let mut test_button = Button::new_alloc();
        test_button.set_text("Begin Test");
        test_button.set_custom_minimum_size(Vector2::new(100.0, 28.0));
        test_button.set_tooltip_text("Bring collision up to date for a test drive");
        toolbar.add_child(&test_button);

        // ═══════════════════════════════════════════════════════════════════
        // Brush Section
        // ═══════════════════════════════════════════════════════════════════
        let mut sep = VSeparator::new_alloc();
        sep.set_custom_minimum_size(Vector2::new(0.0, 8.0));
        toolbar.add_child(&sep);

        let mut brush_label = Label::new_alloc();
        brush_label.set_text("Brush");
        toolbar.add_child(&brush_label);

        let mut tool_button = Button::new_alloc();
        tool_button.set_text("Raise");
        tool_button.set_custom_minimum_size(Vector2::new(100.0, 28.0));
        tool_button.set_tooltip_text("Cycle brush tool (T)");
        toolbar.add_child(&tool_button);

        let mut radius_label = Label::new_alloc();
        radius_label.set_text("Radius:");
        toolbar.add_child(&radius_label);

        let mut radius_slider = HSlider::new_alloc();
        radius_slider.set_min(limits.min_radius as f64);
        radius_slider.set_max(limits.max_radius as f64);
        radius_slider.set_step(1.0);
        radius_slider.set_value(8.0);
        radius_slider.set_custom_minimum_size(Vector2::new(100.0, 0.0));
        radius_slider.set_tooltip_text("Brush radius ([ / ] keys, Shift + wheel)");
        toolbar.add_child(&radius_slider);

        let mut strength_label = Label::new_alloc();
        strength_label.set_text("Strength:");
        toolbar.add_child(&strength_label);

        let mut strength_slider = HSlider::new_alloc();
        strength_slider.set_min(-limits.max_strength as f64);
        strength_slider.set_max(limits.max_strength as f64);
        strength_slider.set_step(0.5);
        strength_slider.set_value(15.0);
        strength_slider.set_custom_minimum_size(Vector2::new(100.0, 0.0));
        toolbar.add_child(&strength_slider);

        let mut falloff_label = Label::new_alloc();
        falloff_label.set_text("Falloff:");
        toolbar.add_child(&falloff_label);

        let mut falloff_slider = HSlider::new_alloc();
        falloff_slider.set_min(limits.min_falloff as f64);
        falloff_slider.set_max(limits.max_falloff as f64);
        falloff_slider.set_step(0.1);
        falloff_slider.set_value(1.0);
        falloff_slider.set_custom_minimum_size(Vector2::new(100.0, 0.0));
        falloff_slider.set_tooltip_text("Brush falloff exponent");
        toolbar.add_child(&falloff_slider);

        let mut layer_label = Label::new_alloc();
        layer_label.set_text("Paint layer:");
        toolbar.add_child(&layer_label);

        let mut layer_container = HBoxContainer::new_alloc();
        layer_container.add_theme_constant_override("separation", 2);

        let mut layer_buttons: [Option<Gd<Button>>; NUM_TERRAIN_LAYERS] = [None, None, None, None];
        for (i, slot) in layer_buttons.iter_mut().enumerate() {
            let mut layer_button = Button::new_alloc();
            layer_button.set_text(&format!("{}", i + 1));
            layer_button.set_toggle_mode(true);
            layer_button.set_custom_minimum_size(Vector2::new(28.0, 28.0));
            layer_button.set_tooltip_text(&format!("Paint layer {} ({})", i + 1, i + 1));
            layer_container.add_child(&layer_button);
            *slot = Some(layer_button);
        }
        toolbar.add_child(&layer_container);

        margin_container.add_child(&toolbar);

        // ═══════════════════════════════════════════════════════════════════
        // Connect Signals
        // ═══════════════════════════════════════════════════════════════════
        let plugin_ref = self.to_gd();

        generate_button.connect(
            "pressed",
            &Callable::from_object_method(&plugin_ref, "on_generate_pressed"),
        );
        collision_button.connect(
            "pressed",
            &Callable::from_object_method(&plugin_ref, "on_collision_pressed"),
        );
        test_button.connect(
            "pressed",
            &Callable::from_object_method(&plugin_ref, "on_test_pressed"),
        );
        tool_button.connect(
            "pressed",
            &Callable::from_object_method(&plugin_ref, "on_tool_pressed"),
        );
        radius_slider.connect(
            "value_changed",
            &Callable::from_object_method(&plugin_ref, "on_radius_changed"),
        );
        strength_slider.connect(
            "value_changed",
            &Callable::from_object_method(&plugin_ref, "on_strength_changed"),
        );
        falloff_slider.connect(
            "value_changed",
            &Callable::from_object_method(&plugin_ref, "on_falloff_changed"),
        );
        for (i, layer_btn) in layer_buttons.iter().enumerate() {
            if let Some(ref btn) = layer_btn {
                let method_name = format!("on_layer_{}_pressed", i);
                btn.clone().connect(
                    "pressed",
                    &Callable::from_object_method(&plugin_ref, &method_name),
                );
            }
        }

        self.base_mut().add_control_to_container(
            CustomControlContainer::SPATIAL_EDITOR_SIDE_LEFT,
            &margin_container,
        );

        self.margin_container = Some(margin_container);
        self.tool_button = Some(tool_button);
        self.radius_slider = Some(radius_slider);
        self.strength_slider = Some(strength_slider);
        self.falloff_slider = Some(falloff_slider);
        self.layer_buttons = layer_buttons;
    }

    fn exit_tree(&mut self) {
        self.tool_button = None;
        self.radius_slider = None;
        self.strength_slider = None;
        self.falloff_slider = None;
        self.layer_buttons = [None, None, None, None];

        if let Some(mut margin) = self.margin_container.take() {
            self.base_mut().remove_control_from_container(
                CustomControlContainer::SPATIAL_EDITOR_SIDE_LEFT,
                &margin,
            );
            margin.queue_free();
        }
    }

    fn handles(&self, object: Gd<Object>) -> bool {
        object.is_class("RacingTerrain")
    }

    fn edit(&mut self, object: Option<Gd<Object>>) {
        if let Some(obj) = object {
            if let Ok(node) = obj.try_cast::<Node>() {
                self.current_terrain = Some(node);
                self.set_ui_visible(true);
                self.sync_ui_from_terrain();
                return;
            }
        }
        self.set_ui_visible(false)
    }

    fn make_visible(&mut self, visible: bool) {
        if !visible && self.is_modifying {
            return;
        }

        self.set_ui_visible(visible);
        if !visible {
            // Leaving terrain mode: finish the stroke and bring physics up to date.
            self.call_terrain_method("switch_from");
            self.current_terrain = None;
        }
    }

    fn forward_3d_gui_input(
        &mut self,
        camera: Option<Gd<Camera3D>>,
        event: Option<Gd<InputEvent>>,
    ) -> i32 {
        let Some(event) = event else {
            return AfterGuiInput::PASS.ord();
        };

        if let Ok(key_event) = event.clone().try_cast::<InputEventKey>() {
            if key_event.is_pressed() && !key_event.is_echo() {
                match key_event.get_keycode() {
                    Key::T => {
                        self.cycle_tool();
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::G => {
                        self.do_generate();
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::BRACKETLEFT => {
                        self.adjust_radius(-1.0);
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::BRACKETRIGHT => {
                        self.adjust_radius(1.0);
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::KEY_1 => {
                        self.select_layer(0);
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::KEY_2 => {
                        self.select_layer(1);
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::KEY_3 => {
                        self.select_layer(2);
                        return AfterGuiInput::STOP.ord();
                    }
                    Key::KEY_4 => {
                        self.select_layer(3);
                        return AfterGuiInput::STOP.ord();
                    }
                    _ => {}
                }
            }
        }

        let Some(camera) = camera else {
            return AfterGuiInput::PASS.ord();
        };

        if let Ok(mouse_button) = event.clone().try_cast::<InputEventMouseButton>() {
            let screen_pos = mouse_button.get_position();
            let (origin, direction) = cursor_ray(&camera, screen_pos);
            let button = mouse_button.get_button_index();

            if button == MouseButton::LEFT {
                if mouse_button.is_pressed() {
                    let hit = self
                        .call_terrain_method_with_args(
                            "begin_stroke",
                            &[origin.to_variant(), direction.to_variant()],
                        )
                        .try_to::<bool>()
                        .unwrap_or(false);
                    if hit {
                        return AfterGuiInput::STOP.ord();
                    }
                } else if self.is_stroking() {
                    self.call_terrain_method("end_stroke");
                    return AfterGuiInput::STOP.ord();
                }
            } else if mouse_button.is_shift_pressed() && mouse_button.is_pressed() {
                if button == MouseButton::WHEEL_UP {
                    self.adjust_radius(1.0);
                    return AfterGuiInput::STOP.ord();
                } else if button == MouseButton::WHEEL_DOWN {
                    self.adjust_radius(-1.0);
                    return AfterGuiInput::STOP.ord();
                }
            }
        }

        if let Ok(mouse_motion) = event.try_cast::<InputEventMouseMotion>() {
            let (origin, direction) = cursor_ray(&camera, mouse_motion.get_position());
            let args = [origin.to_variant(), direction.to_variant()];
            self.call_terrain_method_with_args("hover_ray", &args);
            if self.is_stroking() {
                self.call_terrain_method_with_args("update_stroke", &args);
                return AfterGuiInput::STOP.ord();
            }
        }

        AfterGuiInput::PASS.ord()
    }
}

#[godot_api]
impl RacingTerrainPlugin {
    #[func]
    fn on_generate_pressed(&mut self) {
        self.do_generate();
    }

    #[func]
    fn on_collision_pressed(&mut self) {
        self.call_terrain_method("regenerate_collision_mesh");
    }

    #[func]
    fn on_test_pressed(&mut self) {
        self.call_terrain_method("begin_test");
    }

    #[func]
    fn on_tool_pressed(&mut self) {
        self.cycle_tool();
    }

    #[func]
    fn on_radius_changed(&mut self, value: f64) {
        self.call_terrain_method_with_args("set_brush_radius", &[(value as f32).to_variant()]);
    }

    #[func]
    fn on_strength_changed(&mut self, value: f64) {
        self.call_terrain_method_with_args("set_brush_strength", &[(value as f32).to_variant()]);
    }

    #[func]
    fn on_falloff_changed(&mut self, value: f64) {
        self.call_terrain_method_with_args("set_brush_falloff", &[(value as f32).to_variant()]);
    }

    #[func]
    fn on_layer_0_pressed(&mut self) {
        self.select_layer(0);
    }

    #[func]
    fn on_layer_1_pressed(&mut self) {
        self.select_layer(1);
    }

    #[func]
    fn on_layer_2_pressed(&mut self) {
        self.select_layer(2);
    }

    #[func]
    fn on_layer_3_pressed(&mut self) {
        self.select_layer(3);
    }
}

impl RacingTerrainPlugin {
    fn set_ui_visible(&mut self, visible: bool) {
        if let Some(ref mut margin) = self.margin_container {
            margin.set_visible(visible);
        }
    }

    fn call_terrain_method(&mut self, method_name: &str) {
        self.call_terrain_method_with_args(method_name, &[]);
    }

    fn call_terrain_method_with_args(&mut self, method_name: &str, args: &[Variant]) -> Variant {
        if let Some(ref terrain) = self.current_terrain {
            if terrain.is_instance_valid() {
                let mut terrain_clone = terrain.clone();
                if terrain_clone.has_method(method_name) {
                    self.is_modifying = true;
                    let result = terrain_clone.call(method_name, args);
                    self.is_modifying = false;
                    return result;
                }
            }
        }
        Variant::nil()
    }

    fn do_generate(&mut self) {
        self.call_terrain_method_with_args(
            "generate",
            &[
                GENERATE_HEIGHT_SCALE.to_variant(),
                GENERATE_NOISE_SCALE.to_variant(),
            ],
        );
    }

    fn is_stroking(&mut self) -> bool {
        self.call_terrain_method_with_args("is_stroking", &[])
            .try_to::<bool>()
            .unwrap_or(false)
    }

    fn cycle_tool(&mut self) {
        let name = self.call_terrain_method_with_args("cycle_tool", &[]);
        if let (Some(btn), Ok(name)) = (self.tool_button.as_mut(), name.try_to::<GString>()) {
            btn.set_text(&name);
        }
    }

    fn adjust_radius(&mut self, delta: f32) {
        self.call_terrain_method_with_args("adjust_brush_radius", &[delta.to_variant()]);
        let radius = self.call_terrain_method_with_args("get_brush_radius", &[]);
        if let (Some(slider), Ok(radius)) = (self.radius_slider.as_mut(), radius.try_to::<f32>()) {
            slider.set_value_no_signal(radius as f64);
        }
    }

    fn select_layer(&mut self, index: i32) {
        self.call_terrain_method_with_args("set_paint_layer", &[index.to_variant()]);
        self.update_layer_buttons(index as usize);
    }

    fn update_layer_buttons(&mut self, selected: usize) {
        for (i, btn_opt) in self.layer_buttons.iter_mut().enumerate() {
            if let Some(ref mut btn) = btn_opt {
                btn.set_pressed_no_signal(i == selected);
            }
        }
    }

    /// Sync UI state from the terrain node (called when selecting terrain)
    fn sync_ui_from_terrain(&mut self) {
        let tool = self.call_terrain_method_with_args("get_tool_name", &[]);
        if let (Some(btn), Ok(tool)) = (self.tool_button.as_mut(), tool.try_to::<GString>()) {
            btn.set_text(&tool);
        }

        let radius = self.call_terrain_method_with_args("get_brush_radius", &[]);
        if let (Some(slider), Ok(radius)) = (self.radius_slider.as_mut(), radius.try_to::<f32>()) {
            slider.set_value_no_signal(radius as f64);
        }

        let falloff = self.call_terrain_method_with_args("get_brush_falloff", &[]);
        if let (Some(slider), Ok(falloff)) = (self.falloff_slider.as_mut(), falloff.try_to::<f32>()) {
            slider.set_value_no_signal(falloff as f64);
        }

        let layer = self.call_terrain_method_with_args("get_paint_layer", &[]);
        self.update_layer_buttons(layer.try_to::<i32>().unwrap_or(0).max(0) as usize);
    }
}

/// Camera ray through a viewport position, in Godot space.
fn cursor_ray(camera: &Gd<Camera3D>, screen_pos: Vector2) -> (Vector3, Vector3) {
    (
        camera.project_ray_origin(screen_pos),
        camera.project_ray_normal(screen_pos),
    )
}
